use std::fmt;

/// Stream session states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transcoder; waiting for a destination
    #[default]
    Idle,
    /// Transcoder is being spawned
    Starting,
    /// Transcoder accepts media chunks
    Streaming,
    /// Termination requested, waiting for the transcoder to exit
    Stopping,
    /// Connection closed; no further events are processed
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Starting => write!(f, "STARTING"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

impl SessionState {
    /// Check if chunks may be forwarded
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// States in which the session owns a transcoder
    pub fn has_process(&self) -> bool {
        matches!(self, Self::Starting | Self::Streaming | Self::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Pure business rule: which transitions the session state machine allows
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, Starting) => true,
            (Starting, Streaming) | (Starting, Stopping) | (Starting, Idle) => true,
            (Streaming, Stopping) | (Streaming, Idle) => true,
            (Stopping, Idle) => true,
            _ => false,
        }
    }
}
