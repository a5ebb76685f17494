use std::fmt;

use bytes::Bytes;

/// Inbound notification from the transport for one connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Start (or restart) the encoding pipeline towards a destination
    Configure {
        stream_url: String,
        stream_key: String,
    },
    /// One piece of encoded media
    Chunk(Bytes),
    /// Graceful termination of the current pipeline
    Stop,
    /// Connection closed
    Disconnect,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::Chunk(_) => "chunk",
            Self::Stop => "stop",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Outbound notification to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Transcoder is accepting input
    Ready,
    Error { kind: ErrorKind, detail: String },
}

impl ServerEvent {
    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Error {
            kind,
            detail: detail.into(),
        }
    }
}

/// Stable error tags surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SpawnError,
    UnexpectedExit,
    Backpressure,
    InvalidDestination,
    MalformedMessage,
    Terminated,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpawnError => "spawn_error",
            Self::UnexpectedExit => "unexpected_exit",
            Self::Backpressure => "backpressure",
            Self::InvalidDestination => "invalid_destination",
            Self::MalformedMessage => "malformed_message",
            Self::Terminated => "terminated",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
