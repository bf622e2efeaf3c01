//! Pipeline coordination: the per-session execution lock and the
//! STT → LLM → tools → TTS run.

pub mod coordinator;
pub mod errors;
pub mod events;
pub mod lock;

pub use coordinator::{Engines, PipelineConfig, PipelineCoordinator, RunInput, RunRequest};
pub use errors::{PipelineError, PipelineResult};
pub use events::{RunEvent, RunEventKind};
pub use lock::{ExecutionLock, RunGuard};
