//! Reassembles tool-call JSON from streamed LLM fragments.
//!
//! Language models emit tool calls a few characters at a time. Fragments are
//! appended to a buffer and a parse is attempted once the buffer holds a
//! brace-balanced object. Fragments made only of whitespace are ignored and
//! never trigger a parse; a fragment of pure whitespace can arrive in the middle
//! of a call and parsing a half-built buffer there would surface a spurious
//! error.
//!
//! ```text
//! feed("{\"name\":\"get_")   -> Appended
//! feed("  ")                 -> Ignored
//! feed("weather\",\"argu")   -> Appended
//! feed("ments\":{}}")        -> CallReady(ToolCall { name: "get_weather", .. })
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Upper bound on a single buffered call before it is reported as malformed.
pub const DEFAULT_MAX_BUFFER_LEN: usize = 64 * 1024;

/// A complete, parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Result of feeding one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructorEvent {
    /// Empty or whitespace-only fragment; buffer untouched.
    Ignored,
    /// Fragment buffered; call not yet complete.
    Appended,
    /// A complete call was parsed. The buffer holds only what followed it.
    CallReady(ToolCall),
    /// The buffer could not be a valid call and was dropped.
    Malformed(String),
}

/// Tracks brace depth across fragments, ignoring braces inside strings.
#[derive(Debug, Default)]
struct BraceScanner {
    depth: usize,
    started: bool,
    in_string: bool,
    escaped: bool,
    /// Byte offset one past the closing brace of the first complete object.
    complete_at: Option<usize>,
    /// First non-whitespace character was not an opening brace.
    invalid: Option<char>,
}

impl BraceScanner {
    fn scan(&mut self, text: &str, base: usize) {
        if self.complete_at.is_some() || self.invalid.is_some() {
            return;
        }
        for (offset, c) in text.char_indices() {
            if !self.started {
                if c.is_whitespace() {
                    continue;
                }
                if c != '{' {
                    self.invalid = Some(c);
                    return;
                }
                self.started = true;
                self.depth = 1;
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match c {
                '"' => self.in_string = true,
                '{' | '[' => self.depth += 1,
                '}' | ']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.complete_at = Some(base + offset + c.len_utf8());
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Buffers tool-call fragments until a full JSON object is available.
#[derive(Debug)]
pub struct ToolCallReconstructor {
    buffer: String,
    scanner: BraceScanner,
    max_len: usize,
}

impl ToolCallReconstructor {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_BUFFER_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: String::new(),
            scanner: BraceScanner::default(),
            max_len,
        }
    }

    /// Append one fragment and report what happened.
    pub fn feed(&mut self, fragment: &str) -> ReconstructorEvent {
        if fragment.trim().is_empty() {
            return ReconstructorEvent::Ignored;
        }

        let fragment = if self.buffer.is_empty() {
            fragment.trim_start()
        } else {
            fragment
        };
        let base = self.buffer.len();
        self.buffer.push_str(fragment);
        self.scanner.scan(fragment, base);

        if let Some(c) = self.scanner.invalid {
            self.reset();
            return self.malformed(format!("expected '{{' to open a tool call, found '{c}'"));
        }

        if self.scanner.complete_at.is_some() {
            return self.take_call();
        }

        if self.buffer.len() > self.max_len {
            let len = self.buffer.len();
            self.reset();
            return self.malformed(format!(
                "tool call exceeded {} bytes without closing ({len} buffered)",
                self.max_len
            ));
        }

        ReconstructorEvent::Appended
    }

    /// Flush at end of stream. A complete object still buffered is returned;
    /// anything else left over is malformed.
    pub fn finish(&mut self) -> Option<ReconstructorEvent> {
        if self.buffer.trim().is_empty() {
            self.reset();
            return None;
        }
        if self.scanner.complete_at.is_some() {
            return Some(self.take_call());
        }
        let len = self.buffer.len();
        self.reset();
        Some(self.malformed(format!("stream ended inside a tool call ({len} bytes buffered)")))
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanner = BraceScanner::default();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn take_call(&mut self) -> ReconstructorEvent {
        let end = self.scanner.complete_at.unwrap_or(self.buffer.len());
        let tail = self.buffer[end..].trim_start().to_string();
        let head = std::mem::take(&mut self.buffer);
        let head = &head[..end];
        self.scanner = BraceScanner::default();

        if !tail.is_empty() {
            debug!("Tool call reconstructor carrying {} bytes", tail.len());
            self.scanner.scan(&tail, 0);
            self.buffer = tail;
        }

        match serde_json::from_str::<Value>(head) {
            Ok(value) => match call_from_value(value) {
                Ok(call) => ReconstructorEvent::CallReady(call),
                Err(reason) => self.malformed(reason),
            },
            Err(e) => self.malformed(format!("invalid tool call JSON: {e}")),
        }
    }

    fn malformed(&self, reason: String) -> ReconstructorEvent {
        warn!("Malformed tool call: {}", reason);
        ReconstructorEvent::Malformed(reason)
    }
}

impl Default for ToolCallReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts `{"name", "arguments"}` plus the common aliases models produce:
/// `tool` for the name, `args`/`parameters` for the arguments, a nested
/// `function` object, and arguments encoded as a JSON string.
fn call_from_value(value: Value) -> Result<ToolCall, String> {
    let Value::Object(mut map) = value else {
        return Err("tool call is not a JSON object".to_string());
    };

    if let Some(Value::Object(function)) = map.remove("function") {
        for (key, value) in function {
            map.entry(key).or_insert(value);
        }
    }

    let name = ["name", "tool"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "tool call has no name".to_string())?
        .to_string();

    let arguments = match ["arguments", "args", "parameters"]
        .iter()
        .find_map(|key| map.remove(*key))
    {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(raw)) if raw.trim().is_empty() => Value::Object(Default::default()),
        Some(Value::String(raw)) => serde_json::from_str(&raw)
            .map_err(|e| format!("arguments for '{name}' are not valid JSON: {e}"))?,
        Some(other) => other,
    };

    let id = map
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

    Ok(ToolCall {
        id,
        name,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expect_call(event: ReconstructorEvent) -> ToolCall {
        match event {
            ReconstructorEvent::CallReady(call) => call,
            other => panic!("expected CallReady, got {other:?}"),
        }
    }

    #[test]
    fn test_fragmented_call_with_whitespace_fragments() {
        let mut r = ToolCallReconstructor::new();
        assert_eq!(r.feed(r#"{"name":"get_"#), ReconstructorEvent::Appended);
        assert_eq!(r.feed("  "), ReconstructorEvent::Ignored);
        assert_eq!(r.feed(r#"weather","argu"#), ReconstructorEvent::Appended);
        assert_eq!(r.feed(""), ReconstructorEvent::Ignored);
        assert_eq!(r.feed(r#"ments":{"city":"#), ReconstructorEvent::Appended);
        assert_eq!(r.feed("\n"), ReconstructorEvent::Ignored);

        let call = expect_call(r.feed(r#""Paris"}}"#));
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, json!({"city": "Paris"}));
        assert!(call.id.starts_with("call_"));
        assert!(r.is_empty());
    }

    #[test]
    fn test_braces_inside_strings_do_not_close() {
        let mut r = ToolCallReconstructor::new();
        assert_eq!(
            r.feed(r#"{"name":"echo","arguments":{"text":"a } b \" }"#),
            ReconstructorEvent::Appended
        );
        let call = expect_call(r.feed(r#""}}"#));
        assert_eq!(call.arguments, json!({"text": "a } b \" }"}));
    }

    #[test]
    fn test_string_encoded_arguments_and_aliases() {
        let mut r = ToolCallReconstructor::new();
        let call = expect_call(r.feed(r#"{"id":"c1","tool":"lookup","args":"{\"q\":1}"}"#));
        assert_eq!(call.id, "c1");
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, json!({"q": 1}));

        let call = expect_call(
            r.feed(r#"{"function":{"name":"now","parameters":{}}}"#),
        );
        assert_eq!(call.name, "now");
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn test_missing_arguments_default_to_empty_object() {
        let mut r = ToolCallReconstructor::new();
        let call = expect_call(r.feed(r#"{"name":"get_current_time"}"#));
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn test_balanced_but_invalid_is_malformed_and_resets() {
        let mut r = ToolCallReconstructor::new();
        assert!(matches!(
            r.feed(r#"{"name": oops}"#),
            ReconstructorEvent::Malformed(_)
        ));
        assert!(r.is_empty());

        let call = expect_call(r.feed(r#"{"name":"ok"}"#));
        assert_eq!(call.name, "ok");
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let mut r = ToolCallReconstructor::new();
        assert!(matches!(
            r.feed(r#"{"arguments":{}}"#),
            ReconstructorEvent::Malformed(_)
        ));
    }

    #[test]
    fn test_non_object_start_is_malformed() {
        let mut r = ToolCallReconstructor::new();
        assert!(matches!(r.feed("hello"), ReconstructorEvent::Malformed(_)));
        assert!(r.is_empty());
    }

    #[test]
    fn test_overflow_is_malformed_and_resets() {
        let mut r = ToolCallReconstructor::with_max_len(32);
        assert_eq!(r.feed(r#"{"name":"x","arguments":{"#), ReconstructorEvent::Appended);
        assert!(matches!(
            r.feed(r#""data":"aaaaaaaaaaaaaaaaaaaa"#),
            ReconstructorEvent::Malformed(_)
        ));
        assert!(r.is_empty());
    }

    #[test]
    fn test_remainder_after_call_is_kept() {
        let mut r = ToolCallReconstructor::new();
        let call = expect_call(r.feed(r#"{"name":"a"} {"name":"#));
        assert_eq!(call.name, "a");
        assert_eq!(r.buffer, r#"{"name":"#);

        let call = expect_call(r.feed(r#""b"}"#));
        assert_eq!(call.name, "b");
    }

    #[test]
    fn test_finish_reports_incomplete_buffer() {
        let mut r = ToolCallReconstructor::new();
        assert_eq!(r.finish(), None);
        r.feed(r#"{"name":"half"#);
        assert!(matches!(r.finish(), Some(ReconstructorEvent::Malformed(_))));
        assert!(r.is_empty());
    }

    #[test]
    fn test_finish_flushes_carried_complete_call() {
        let mut r = ToolCallReconstructor::new();
        expect_call(r.feed(r#"{"name":"a"}{"name":"b"}"#));
        let call = expect_call(r.finish().unwrap());
        assert_eq!(call.name, "b");
    }
}
