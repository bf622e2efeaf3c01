use std::time::{Duration, Instant};

use super::history::ConversationHistory;
use super::settings::SessionSettings;
use super::state_machine::{SessionState, SessionStateMachine};
use crate::core::pipeline::ExecutionLock;

/// All state owned by one connected client.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub state: SessionStateMachine,
    pub history: ConversationHistory,
    pub execution_lock: ExecutionLock,
    pub last_activity: Instant,
    pub settings: SessionSettings,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionStateMachine::new(),
            history: ConversationHistory::new(),
            execution_lock: ExecutionLock::new(),
            last_activity: Instant::now(),
            settings,
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.state.state()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
