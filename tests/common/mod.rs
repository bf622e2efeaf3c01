#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use parley::core::llm::{LLMError, LLMRequest, LLMResult, LLMStream};
use parley::core::tools::{Tool, ToolError, ToolOutput};
use parley::core::tts::{AudioStream, TTSError, TTSResult};
use parley::{
    AudioData, BaseLLM, BaseSTT, BaseTTS, EnergyVAD, Engines, LLMToken, Role, STTError, STTResult,
    ServerConfig, SessionSettings, ToolRegistry, ToolSpec, VADFactory, VoiceActivityDetector,
    routes, state::AppState,
};

pub const SPEECH: [i16; 512] = [8000; 512];
pub const SILENCE: [i16; 512] = [0; 512];

/// Transcribes every utterance as "what is the weather".
pub struct FixedSTT;

#[async_trait]
impl BaseSTT for FixedSTT {
    async fn transcribe(
        &self,
        _audio: &[i16],
        _settings: &SessionSettings,
    ) -> Result<STTResult, STTError> {
        Ok(STTResult::final_text("what is the weather"))
    }

    fn get_provider_info(&self) -> &'static str {
        "fixed"
    }
}

/// Replies "Sunny today" after an optional tool round trip. With `use_tool`,
/// the first call streams a `get_weather` call split into small fragments
/// with whitespace-only fragments in between.
pub struct WeatherLLM {
    pub use_tool: bool,
}

#[async_trait]
impl BaseLLM for WeatherLLM {
    async fn stream(&self, request: LLMRequest<'_>) -> LLMResult<LLMStream> {
        let tool_answered = request.history.iter().any(|turn| turn.role == Role::Tool);
        let tokens = if self.use_tool && !tool_answered && !request.tools.is_empty() {
            let call = r#"{"id":"call_1","name":"get_weather","arguments":{"city":"London"}}"#;
            let mut tokens = Vec::new();
            for (i, piece) in call.as_bytes().chunks(5).enumerate() {
                let piece = String::from_utf8_lossy(piece).into_owned();
                tokens.push(LLMToken::ToolCall(piece));
                if i % 3 == 0 {
                    tokens.push(LLMToken::ToolCall(" ".to_string()));
                }
            }
            tokens
        } else {
            vec![
                LLMToken::Text("Sunny".to_string()),
                LLMToken::Text(" today".to_string()),
            ]
        };
        Ok(futures::stream::iter(tokens.into_iter().map(Ok)).boxed())
    }

    fn get_provider_info(&self) -> &'static str {
        "weather"
    }
}

/// Streams `chunks` small PCM chunks, `delay` apart.
pub struct ChunkTTS {
    pub chunks: usize,
    pub delay: Duration,
}

#[async_trait]
impl BaseTTS for ChunkTTS {
    async fn synthesize(&self, _text: &str, _settings: &SessionSettings) -> TTSResult<AudioStream> {
        let delay = self.delay;
        let stream = futures::stream::iter(0..self.chunks).then(move |_| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, TTSError>(AudioData::pcm16(vec![1; 960], 24_000))
        });
        Ok(stream.boxed())
    }

    fn get_provider_info(&self) -> &'static str {
        "chunks"
    }
}

/// Backend that is down: every completion fails.
pub struct FailingLLM;

#[async_trait]
impl BaseLLM for FailingLLM {
    async fn stream(&self, _request: LLMRequest<'_>) -> LLMResult<LLMStream> {
        Err(LLMError::ProviderError("backend unavailable".to_string()))
    }

    fn get_provider_info(&self) -> &'static str {
        "failing"
    }
}

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_weather".to_string(),
            description: "Current weather for a city".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<ToolOutput, ToolError> {
        let city = arguments
            .get("city")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "get_weather".to_string(),
                reason: "missing city".to_string(),
            })?;
        Ok(ToolOutput::text(format!("Sunny in {city}")).with_display(json!({"city": city})))
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

impl TestServer {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

pub async fn start_server(use_tool: bool, tts_chunks: usize, tts_delay: Duration) -> TestServer {
    start_server_with_llm(Arc::new(WeatherLLM { use_tool }), tts_chunks, tts_delay).await
}

pub async fn start_server_with_llm(
    llm: Arc<dyn BaseLLM>,
    tts_chunks: usize,
    tts_delay: Duration,
) -> TestServer {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(WeatherTool));

    let engines = Engines {
        stt: Arc::new(FixedSTT),
        llm,
        tts: Arc::new(ChunkTTS {
            chunks: tts_chunks,
            delay: tts_delay,
        }),
        tools: Arc::new(tools),
    };
    let vad_factory: VADFactory =
        Arc::new(|| Box::new(EnergyVAD::default()) as Box<dyn VoiceActivityDetector>);

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    serve(AppState::with_engines(config, engines, vad_factory)).await
}

pub async fn serve(state: Arc<AppState>) -> TestServer {
    let app = routes::app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

/// Fake OpenAI-compatible backend. Accepts one HTTP request, answers with an
/// empty SSE stream and resolves to the lowercased request head.
pub async fn record_one_request() -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = format!("http://{}/v1", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let head_len = loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            assert!(n > 0, "request ended before headers");
        };
        let head = String::from_utf8_lossy(&raw[..head_len]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|len| len.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while raw.len() < head_len + body_len {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }

        let body = "data: [DONE]\n\n";
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        head
    });
    (backend, handle)
}
