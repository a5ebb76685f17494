use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::domain::errors::{DomainError, Result};

/// Bounded queue in front of a process input stream.
///
/// `push` never waits: a full queue rejects the newest chunk with
/// `Backpressure`. A single writer task drains the queue in order.
pub struct StdinPump {
    tx: Option<mpsc::Sender<Bytes>>,
    writer: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl StdinPump {
    pub fn spawn<W>(input: W, capacity: usize, label: String) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let closed = Arc::new(AtomicBool::new(false));
        let writer = tokio::spawn(Self::drain(input, rx, closed.clone(), label));

        Self {
            tx: Some(tx),
            writer,
            closed,
        }
    }

    pub fn push(&self, chunk: Bytes) -> Result<()> {
        let tx = match &self.tx {
            Some(tx) if !self.closed.load(Ordering::SeqCst) => tx,
            _ => return Err(DomainError::Terminated),
        };

        tx.try_send(chunk).map_err(|e| match e {
            TrySendError::Full(_) => DomainError::Backpressure,
            TrySendError::Closed(_) => DomainError::Terminated,
        })
    }

    /// Chunks accepted but not yet written
    pub fn pending(&self) -> usize {
        self.tx
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Discard queued chunks and close the input stream now
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.tx = None;
        self.writer.abort();
    }

    async fn drain<W>(
        mut input: W,
        mut rx: mpsc::Receiver<Bytes>,
        closed: Arc<AtomicBool>,
        label: String,
    ) where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = input.write_all(&chunk).await {
                tracing::warn!(transcoder = %label, "Error writing to transcoder stdin: {}", e);
                break;
            }
        }

        closed.store(true, Ordering::SeqCst);
        if let Err(e) = input.shutdown().await {
            tracing::debug!(transcoder = %label, "Closing transcoder stdin: {}", e);
        }
    }
}

impl Drop for StdinPump {
    fn drop(&mut self) {
        self.writer.abort();
    }
}
