//! Per-client conversation sessions.
//!
//! A [`Session`] owns the conversation state machine, the history and the
//! execution lock. The session actor in [`actor`] is the only code that
//! mutates it; everything else talks to it through a [`SessionHandle`].

pub mod actor;
pub mod history;
pub mod messages;
pub mod model;
pub mod settings;
pub mod state_machine;

pub use actor::{SessionClosed, SessionConfig, SessionHandle};
pub use history::{ConversationHistory, Role, Turn};
pub use messages::{SessionCommand, SessionInput, SessionOutput, SessionSnapshot};
pub use model::Session;
pub use settings::{BackendCredentials, SessionSettings, SettingsError, SettingsUpdate, validate_backend};
pub use state_machine::{InvalidTransition, SessionEvent, SessionState, SessionStateMachine};
