use thiserror::Error;

use crate::domain::value_objects::{ErrorKind, ExitReport, SessionState};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid encoder profile: {0}")]
    InvalidEncoderProfile(String),

    #[error("Invalid buffer capacity: must be greater than zero")]
    InvalidBufferCapacity,

    #[error("Transcoder spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Transcoder input queue is full")]
    Backpressure,

    #[error("Transcoder exited unexpectedly: {0}")]
    UnexpectedExit(ExitReport),

    #[error("Transcoder already terminated")]
    Terminated,

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

impl DomainError {
    /// Stable tag reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDestination(_) => ErrorKind::InvalidDestination,
            Self::SpawnFailed(_) => ErrorKind::SpawnError,
            Self::Backpressure => ErrorKind::Backpressure,
            Self::UnexpectedExit(_) => ErrorKind::UnexpectedExit,
            Self::Terminated => ErrorKind::Terminated,
            Self::InvalidEncoderProfile(_)
            | Self::InvalidBufferCapacity
            | Self::InvalidTransition { .. } => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
