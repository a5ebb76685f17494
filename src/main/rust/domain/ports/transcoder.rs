use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::domain::errors::Result;
use crate::domain::value_objects::{Destination, ExitReport};

/// Resolves exactly once, when the transcoder process has terminated
pub type ExitReceiver = oneshot::Receiver<ExitReport>;

/// A freshly spawned transcoder and its exit notification
pub struct LaunchedTranscoder {
    pub process: Box<dyn TranscoderProcess>,
    pub exit: ExitReceiver,
}

/// Port for spawning transcoder processes
#[async_trait]
pub trait TranscoderLauncher: Send + Sync {
    /// Spawn a transcoder publishing to `destination`
    async fn launch(&self, destination: &Destination) -> Result<LaunchedTranscoder>;
}

/// Port for a running transcoder process
pub trait TranscoderProcess: Send {
    /// OS process id, when known
    fn pid(&self) -> Option<u32>;

    /// Queue a chunk for the transcoder's input without blocking.
    ///
    /// Returns `Backpressure` when the input queue is full (the chunk is
    /// dropped) and `Terminated` once the process was stopped or has exited.
    fn feed(&mut self, chunk: Bytes) -> Result<()>;

    /// Request graceful termination. Idempotent and non-blocking; the exit is
    /// observed through the `ExitReceiver`.
    fn stop(&mut self);

    /// True once the input stream has been closed
    fn is_input_closed(&self) -> bool;

    /// Chunks queued but not yet written
    fn pending_chunks(&self) -> usize;
}
