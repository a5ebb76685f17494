use std::collections::VecDeque;
use std::time::Instant;

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::SessionState;

/// Most recent transitions kept per session
const HISTORY_LIMIT: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Domain entity tracking one stream session's state machine
#[derive(Debug)]
pub struct SessionLifecycle {
    current_state: SessionState,
    state_history: VecDeque<StateTransition>,
    transition_count: usize,
    streaming_since: Option<Instant>,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
            state_history: VecDeque::new(),
            transition_count: 0,
            streaming_since: None,
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    /// Time spent in the current streaming run, if streaming
    pub fn streaming_uptime(&self) -> Option<std::time::Duration> {
        self.streaming_since.map(|start| start.elapsed())
    }

    pub fn transition_count(&self) -> usize {
        self.transition_count
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.state_history.iter()
    }

    pub fn transition_to_starting(&mut self) -> Result<()> {
        self.record_transition(SessionState::Starting, None)
    }

    pub fn transition_to_streaming(&mut self) -> Result<()> {
        self.record_transition(SessionState::Streaming, None)?;
        self.streaming_since = Some(Instant::now());
        Ok(())
    }

    pub fn transition_to_stopping(&mut self, reason: impl Into<String>) -> Result<()> {
        self.record_transition(SessionState::Stopping, Some(reason.into()))
    }

    pub fn transition_to_idle(&mut self, reason: impl Into<String>) -> Result<()> {
        self.record_transition(SessionState::Idle, Some(reason.into()))
    }

    pub fn transition_to_terminated(&mut self, reason: impl Into<String>) -> Result<()> {
        self.record_transition(SessionState::Terminated, Some(reason.into()))
    }

    fn record_transition(&mut self, new_state: SessionState, reason: Option<String>) -> Result<()> {
        if !self.current_state.can_transition_to(new_state) {
            return Err(DomainError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        };

        if self.state_history.len() == HISTORY_LIMIT {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition);
        self.transition_count += 1;

        if !new_state.is_streaming() {
            self.streaming_since = None;
        }
        self.current_state = new_state;
        Ok(())
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
