//! OpenAI-compatible `chat/completions` streaming adapter.
//!
//! Text deltas become [`LLMToken::Text`]. Tool-call deltas are re-emitted as
//! raw JSON fragments of the shape
//! `{"id":"..","name":"..","arguments":<argument fragments>}` so the pipeline
//! reassembles them with the same reconstructor it uses for any engine.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, trace, warn};

use super::base::{BaseLLM, LLMError, LLMRequest, LLMResult, LLMStream, LLMToken};
use crate::core::session::{BackendCredentials, Role, Turn};
use crate::core::tools::ToolSpec;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAICompatibleLLM {
    client: reqwest::Client,
    credentials: BackendCredentials,
    idle_timeout: Duration,
}

impl OpenAICompatibleLLM {
    pub fn new(credentials: BackendCredentials, connect_timeout: Duration) -> LLMResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LLMError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            credentials,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

#[async_trait]
impl BaseLLM for OpenAICompatibleLLM {
    async fn stream(&self, request: LLMRequest<'_>) -> LLMResult<LLMStream> {
        let url = request.settings.endpoint("chat/completions");
        let body = build_request_body(&request);
        debug!(
            "LLM request to {} (model={}, turns={}, tools={})",
            url,
            request.settings.model,
            request.history.len(),
            request.tools.len()
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = self.credentials.key_for(&request.settings.backend) {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LLMError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("LLM backend returned {}: {}", status, text);
            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                _ => LLMError::ProviderError(format!("HTTP {status}: {text}")),
            });
        }

        Ok(sse_token_stream(response, self.idle_timeout))
    }

    fn get_provider_info(&self) -> &'static str {
        "openai-compatible"
    }
}

pub(crate) fn build_request_body(request: &LLMRequest<'_>) -> Value {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    if let Some(prompt) = &request.settings.system_prompt {
        messages.push(json!({"role": "system", "content": prompt}));
    }
    for turn in request.history {
        push_turn(&mut messages, turn);
    }

    let mut body = json!({
        "model": request.settings.model,
        "messages": messages,
        "stream": true,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.iter().map(tool_definition).collect());
    }
    body
}

fn push_turn(messages: &mut Vec<Value>, turn: &Turn) {
    match (turn.role, &turn.tool_call) {
        (Role::User, _) => messages.push(json!({"role": "user", "content": turn.text})),
        (Role::Assistant, _) => {
            messages.push(json!({"role": "assistant", "content": turn.text}))
        }
        (Role::Tool, Some(call)) => {
            messages.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    },
                }],
            }));
            messages.push(json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": turn.text,
            }));
        }
        (Role::Tool, None) => {
            warn!("Tool turn without a call record; sending as user context");
            messages.push(json!({"role": "user", "content": turn.text}));
        }
    }
}

fn tool_definition(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        },
    })
}

#[derive(Debug, Deserialize)]
struct ChunkData {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Re-encodes indexed tool-call deltas as one flat fragment sequence.
#[derive(Debug, Default)]
struct ToolDeltaEncoder {
    open: Option<usize>,
    args_seen: bool,
}

impl ToolDeltaEncoder {
    fn push(&mut self, delta: ToolCallDelta, out: &mut VecDeque<LLMResult<LLMToken>>) {
        let (name, arguments) = match delta.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };

        if self.open != Some(delta.index) {
            self.close(out);
            let header = format!(
                "{{\"id\":{},\"name\":{},\"arguments\":",
                json!(delta.id.unwrap_or_default()),
                json!(name.unwrap_or_default()),
            );
            out.push_back(Ok(LLMToken::ToolCall(header)));
            self.open = Some(delta.index);
            self.args_seen = false;
        }

        if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
            if !arguments.trim().is_empty() {
                self.args_seen = true;
            }
            out.push_back(Ok(LLMToken::ToolCall(arguments)));
        }
    }

    fn close(&mut self, out: &mut VecDeque<LLMResult<LLMToken>>) {
        if self.open.take().is_some() {
            let tail = if self.args_seen { "}" } else { "{}}" };
            out.push_back(Ok(LLMToken::ToolCall(tail.to_string())));
        }
        self.args_seen = false;
    }
}

/// Turns SSE `data:` payloads into tokens.
#[derive(Debug, Default)]
struct ChunkDecoder {
    pending: VecDeque<LLMResult<LLMToken>>,
    tools: ToolDeltaEncoder,
    done: bool,
}

impl ChunkDecoder {
    fn handle_data(&mut self, raw: &str) {
        trace!("LLM SSE: {:?}", raw);
        if raw.trim() == "[DONE]" {
            self.finish();
            return;
        }

        let chunk: ChunkData = match serde_json::from_str(raw) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.fail(LLMError::InvalidResponse(format!(
                    "SSE parsing error: {e}, data: {raw}"
                )));
                return;
            }
        };

        if let Some(err) = chunk.error {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            self.fail(LLMError::ProviderError(message));
            return;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.tools.close(&mut self.pending);
            self.pending.push_back(Ok(LLMToken::Text(content)));
        }
        for delta in choice.delta.tool_calls.unwrap_or_default() {
            self.tools.push(delta, &mut self.pending);
        }
        if choice.finish_reason.is_some() {
            self.tools.close(&mut self.pending);
        }
    }

    fn finish(&mut self) {
        self.tools.close(&mut self.pending);
        self.done = true;
    }

    fn fail(&mut self, err: LLMError) {
        error!("LLM stream error: {}", err);
        self.pending.push_back(Err(err));
        self.done = true;
    }
}

fn sse_token_stream(response: reqwest::Response, idle_timeout: Duration) -> LLMStream {
    let events = response.bytes_stream().eventsource().boxed();
    let state = (events, ChunkDecoder::default());

    futures::stream::unfold(state, move |(mut events, mut decoder)| async move {
        loop {
            if let Some(item) = decoder.pending.pop_front() {
                return Some((item, (events, decoder)));
            }
            if decoder.done {
                return None;
            }
            match tokio::time::timeout(idle_timeout, events.next()).await {
                Ok(Some(Ok(event))) => decoder.handle_data(&event.data),
                Ok(Some(Err(e))) => decoder.fail(LLMError::StreamError(e.to_string())),
                Ok(None) => decoder.finish(),
                Err(_) => decoder.fail(LLMError::Timeout(format!(
                    "no data for {}s",
                    idle_timeout.as_secs()
                ))),
            }
        }
    })
    .boxed()
}
