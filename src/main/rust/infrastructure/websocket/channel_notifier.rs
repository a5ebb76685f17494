use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::ports::ClientNotifier;
use crate::domain::value_objects::ServerEvent;

/// Queues notifications for the connection's socket writer
pub struct ChannelNotifier {
    tx: mpsc::Sender<ServerEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { tx }
    }
}

impl ClientNotifier for ChannelNotifier {
    fn notify(&self, event: ServerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "Outbound queue full, dropping notification")
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Socket writer gone, dropping notification")
            }
        }
    }
}
