//! Sequences one conversational turn: STT, LLM with the tool loop, then TTS.
//!
//! A run owns a [`RunGuard`] for its whole lifetime and reports progress as
//! [`RunEvent`]s. Every await on an engine races the run's cancellation token,
//! so a barge-in stops the run at whichever stage it is in.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{PipelineError, PipelineResult};
use super::events::{RunEvent, RunEventKind};
use super::lock::{ExecutionLock, RunGuard};
use crate::core::llm::{
    BaseLLM, DEFAULT_MAX_BUFFER_LEN, LLMRequest, LLMToken, ReconstructorEvent, ToolCall,
    ToolCallReconstructor,
};
use crate::core::session::{SessionSettings, Turn};
use crate::core::stt::BaseSTT;
use crate::core::tools::{ToolError, ToolExecutor, ToolOutput, ToolSpec};
use crate::core::tts::BaseTTS;

/// The external engines a pipeline calls.
#[derive(Clone)]
pub struct Engines {
    pub stt: Arc<dyn BaseSTT>,
    pub llm: Arc<dyn BaseLLM>,
    pub tts: Arc<dyn BaseTTS>,
    pub tools: Arc<dyn ToolExecutor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Model calls that may request tools before the final, tool-less call
    pub max_tool_iterations: usize,
    /// Upper bound on one buffered tool call
    pub tool_call_buffer_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            tool_call_buffer_limit: DEFAULT_MAX_BUFFER_LEN,
        }
    }
}

/// What started the turn.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// A finished utterance, 16 kHz mono PCM16
    Utterance(Vec<i16>),
    /// Typed text; skips STT
    Text(String),
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: RunInput,
    /// History as of the start of the run
    pub history: Vec<Turn>,
    pub settings: SessionSettings,
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    engines: Engines,
    config: PipelineConfig,
}

impl PipelineCoordinator {
    pub fn new(engines: Engines, config: PipelineConfig) -> Self {
        Self { engines, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a turn on the current task. Fails fast with
    /// [`PipelineError::AlreadyRunning`] if the session already has a run.
    pub async fn run<E>(
        &self,
        lock: &ExecutionLock,
        request: RunRequest,
        events: mpsc::Sender<E>,
    ) -> PipelineResult<()>
    where
        E: From<RunEvent> + Send + 'static,
    {
        let guard = lock.try_acquire()?;
        self.execute(guard, request, events).await
    }

    /// Acquire the lock now and run the turn on a spawned task. Returns the
    /// run id that tags every event of this run.
    pub fn spawn<E>(
        &self,
        lock: &ExecutionLock,
        request: RunRequest,
        events: mpsc::Sender<E>,
    ) -> PipelineResult<u64>
    where
        E: From<RunEvent> + Send + 'static,
    {
        let guard = lock.try_acquire()?;
        let run_id = guard.run_id();
        let coordinator = self.clone();
        tokio::spawn(async move {
            let _ = coordinator.execute(guard, request, events).await;
        });
        Ok(run_id)
    }

    async fn execute<E>(
        &self,
        guard: RunGuard,
        request: RunRequest,
        events: mpsc::Sender<E>,
    ) -> PipelineResult<()>
    where
        E: From<RunEvent> + Send + 'static,
    {
        let run_id = guard.run_id();
        let cancel = guard.cancel_token();
        let emitter = Emitter { run_id, tx: events };

        info!("Pipeline run {} started", run_id);
        let result = self.stages(&cancel, request, &emitter).await;
        drop(guard);

        let terminal = match &result {
            Ok(audio_chunks) => {
                info!("Pipeline run {} finished ({} audio chunks)", run_id, audio_chunks);
                RunEventKind::Finished {
                    audio_chunks: *audio_chunks,
                }
            }
            Err(PipelineError::Cancelled) => {
                info!("Pipeline run {} cancelled", run_id);
                RunEventKind::Cancelled
            }
            Err(e) => {
                warn!("Pipeline run {} failed: {}", run_id, e);
                RunEventKind::Failed {
                    message: e.to_string(),
                }
            }
        };
        let _ = emitter.send(terminal).await;
        result.map(|_| ())
    }

    async fn stages<E>(
        &self,
        cancel: &CancellationToken,
        request: RunRequest,
        emitter: &Emitter<E>,
    ) -> PipelineResult<u64>
    where
        E: From<RunEvent> + Send + 'static,
    {
        let RunRequest {
            input,
            mut history,
            settings,
        } = request;

        let user_text = match input {
            RunInput::Utterance(samples) => {
                let result =
                    cancellable(cancel, self.engines.stt.transcribe(&samples, &settings)).await??;
                emitter
                    .send(RunEventKind::Transcript {
                        text: result.transcript.clone(),
                        is_final: result.is_final,
                    })
                    .await?;
                if result.is_empty() {
                    info!("Empty transcript, ending run {}", emitter.run_id);
                    return Ok(0);
                }
                result.transcript
            }
            RunInput::Text(text) => text,
        };

        let user_turn = Turn::user(user_text);
        history.push(user_turn.clone());
        emitter.send(RunEventKind::Turn(user_turn)).await?;

        let reply = self
            .converse(cancel, &mut history, &settings, emitter)
            .await?;
        let reply = reply.trim().to_string();
        if reply.is_empty() {
            info!("Empty reply, ending run {}", emitter.run_id);
            return Ok(0);
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        emitter.send(RunEventKind::Response(reply.clone())).await?;
        emitter
            .send(RunEventKind::Turn(Turn::assistant(reply.clone())))
            .await?;

        self.speak(cancel, &reply, &settings, emitter).await
    }

    /// LLM turn with the bounded tool loop. Returns the final reply text.
    async fn converse<E>(
        &self,
        cancel: &CancellationToken,
        history: &mut Vec<Turn>,
        settings: &SessionSettings,
        emitter: &Emitter<E>,
    ) -> PipelineResult<String>
    where
        E: From<RunEvent> + Send + 'static,
    {
        let catalog = self.engines.tools.catalog();
        let mut iteration = 0;

        loop {
            let tools: &[ToolSpec] = if iteration < self.config.max_tool_iterations {
                &catalog
            } else {
                &[]
            };
            let request = LLMRequest {
                history: history.as_slice(),
                tools,
                settings,
            };
            let mut stream = cancellable(cancel, self.engines.llm.stream(request)).await??;

            let mut reconstructor =
                ToolCallReconstructor::with_max_len(self.config.tool_call_buffer_limit);
            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();

            while let Some(token) = cancellable(cancel, stream.next()).await? {
                match token? {
                    LLMToken::Text(chunk) => {
                        text.push_str(&chunk);
                        emitter.send(RunEventKind::ResponseChunk(chunk)).await?;
                    }
                    LLMToken::ToolCall(fragment) => {
                        if tools.is_empty() {
                            debug!("Discarding tool-call fragment after iteration limit");
                            continue;
                        }
                        if let ReconstructorEvent::CallReady(call) = reconstructor.feed(&fragment)
                        {
                            calls.push(call);
                        }
                    }
                }
            }
            if let Some(ReconstructorEvent::CallReady(call)) = reconstructor.finish() {
                calls.push(call);
            }

            if calls.is_empty() {
                return Ok(text);
            }

            let preface = text.trim();
            if !preface.is_empty() {
                let turn = Turn::assistant(preface);
                history.push(turn.clone());
                emitter.send(RunEventKind::Turn(turn)).await?;
            }

            for call in calls {
                let output = self.invoke_tool(cancel, &call, emitter).await?;
                let turn = Turn::tool(call, output.text);
                history.push(turn.clone());
                emitter.send(RunEventKind::Turn(turn)).await?;
            }

            iteration += 1;
            debug!(
                "Tool iteration {} of {} complete",
                iteration, self.config.max_tool_iterations
            );
        }
    }

    async fn invoke_tool<E>(
        &self,
        cancel: &CancellationToken,
        call: &ToolCall,
        emitter: &Emitter<E>,
    ) -> PipelineResult<ToolOutput>
    where
        E: From<RunEvent> + Send + 'static,
    {
        emitter.send(RunEventKind::ToolCall(call.clone())).await?;

        let output = match cancellable(
            cancel,
            self.engines.tools.invoke(&call.name, &call.arguments),
        )
        .await?
        {
            Ok(output) => output,
            Err(ToolError::UnknownTool(name)) => {
                warn!("Model called unknown tool '{}'", name);
                ToolOutput::text(format!("Error: no tool named '{name}' is available"))
            }
            Err(e) => return Err(e.into()),
        };

        emitter
            .send(RunEventKind::ToolResult {
                tool: call.name.clone(),
                result: output.text.clone(),
                display: output.display.clone(),
            })
            .await?;
        Ok(output)
    }

    /// Stream TTS audio for the reply. Returns the number of chunks sent.
    async fn speak<E>(
        &self,
        cancel: &CancellationToken,
        reply: &str,
        settings: &SessionSettings,
        emitter: &Emitter<E>,
    ) -> PipelineResult<u64>
    where
        E: From<RunEvent> + Send + 'static,
    {
        let mut stream = cancellable(cancel, self.engines.tts.synthesize(reply, settings)).await??;
        let mut chunks = 0u64;
        while let Some(chunk) = cancellable(cancel, stream.next()).await? {
            let chunk = chunk?;
            if chunk.data.is_empty() {
                continue;
            }
            emitter.send(RunEventKind::Audio(chunk)).await?;
            chunks += 1;
        }
        Ok(chunks)
    }
}

struct Emitter<E> {
    run_id: u64,
    tx: mpsc::Sender<E>,
}

impl<E: From<RunEvent>> Emitter<E> {
    /// A closed receiver means the session is gone; the run stops as cancelled.
    async fn send(&self, kind: RunEventKind) -> PipelineResult<()> {
        self.tx
            .send(E::from(RunEvent {
                run_id: self.run_id,
                kind,
            }))
            .await
            .map_err(|_| PipelineError::Cancelled)
    }
}

async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> PipelineResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = fut => Ok(output),
    }
}
