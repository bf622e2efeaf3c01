use std::env;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Handle CLI arguments
    let mut config_path: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument '{other}'. Usage: parley [--config <file>]"),
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServerConfig::from_env().context("Failed to load configuration")?,
    };
    let address = config.address();
    info!(
        "Backend {} (llm={}, stt={}, tts={}/{})",
        config.backend_url, config.llm_model, config.stt_model, config.tts_model, config.tts_voice
    );

    // Create application state
    let app_state = AppState::new(config).context("Failed to initialise engines")?;
    let app = routes::app(app_state);

    let listener = TcpListener::bind(&address).await?;
    println!("Server listening on {address}");

    axum::serve(listener, app).await?;

    Ok(())
}
