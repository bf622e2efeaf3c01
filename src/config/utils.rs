use std::env;
use std::str::FromStr;

use super::{ConfigError, ConfigResult};

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Read and parse an environment variable. Unset and empty values are `None`;
/// a value that does not parse is an error rather than silently ignored.
pub fn env_parsed<T>(key: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw,
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}

pub fn env_bool(key: &'static str) -> ConfigResult<Option<bool>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            parse_bool(raw.trim())
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key,
                    value: raw,
                    reason: "expected true/false, yes/no or 1/0".to_string(),
                })
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_bool_true_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("Yes"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_variants() {
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("NO"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid() {
        assert_eq!(parse_bool("invalid"), None);
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    #[serial]
    fn test_env_parsed() {
        unsafe {
            env::set_var("PORT", "8080");
        }
        assert_eq!(env_parsed::<u16>("PORT").unwrap(), Some(8080));

        unsafe {
            env::set_var("PORT", "eighty");
        }
        let err = env_parsed::<u16>("PORT").unwrap_err();
        assert!(err.to_string().contains("PORT"));

        unsafe {
            env::set_var("PORT", "  ");
        }
        assert_eq!(env_parsed::<u16>("PORT").unwrap(), None);

        unsafe {
            env::remove_var("PORT");
        }
        assert_eq!(env_parsed::<u16>("PORT").unwrap(), None);
    }

    #[test]
    #[serial]
    fn test_env_bool() {
        unsafe {
            env::set_var("TOOLS_ENABLED", "no");
        }
        assert_eq!(env_bool("TOOLS_ENABLED").unwrap(), Some(false));

        unsafe {
            env::set_var("TOOLS_ENABLED", "maybe");
        }
        assert!(env_bool("TOOLS_ENABLED").is_err());

        unsafe {
            env::remove_var("TOOLS_ENABLED");
        }
    }
}
