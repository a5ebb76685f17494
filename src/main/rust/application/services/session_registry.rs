use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::stream_session::{SessionCanceller, SessionSettings, SessionStats, StreamSession};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{ClientNotifier, MetricsReporter, TranscoderLauncher};
use crate::domain::value_objects::{ClientEvent, ConnectionId};

struct SessionEntry {
    events: mpsc::Sender<ClientEvent>,
    canceller: SessionCanceller,
    /// Taken by the caller that performs teardown
    task: Option<JoinHandle<SessionStats>>,
}

/// Cheap reference to a live session's event queue
#[derive(Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    events: mpsc::Sender<ClientEvent>,
}

impl SessionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Deliver an event in order. Waits while the session's queue is full,
    /// which throttles the transport reading from the client.
    pub async fn dispatch(&self, event: ClientEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| DomainError::Terminated)
    }
}

/// Maps connection ids to their sessions.
///
/// Each session runs on its own task; the registry only routes events and
/// guarantees one session per id and one removal per session.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, SessionEntry>>,
    launcher: Arc<dyn TranscoderLauncher>,
    metrics: Arc<dyn MetricsReporter>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(
        launcher: Arc<dyn TranscoderLauncher>,
        metrics: Arc<dyn MetricsReporter>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            launcher,
            metrics,
            settings,
        }
    }

    /// Return the session for `id`, creating an idle one if needed
    pub async fn get_or_create(
        &self,
        id: ConnectionId,
        notifier: Arc<dyn ClientNotifier>,
    ) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .entry(id)
            .or_insert_with(|| self.spawn_session(id, notifier));

        SessionHandle {
            id,
            events: entry.events.clone(),
        }
    }

    /// Tear the session down and remove it.
    ///
    /// The session is cancelled first, so a reconfigure waiting on the old
    /// transcoder gives up at once instead of spawning a new one.
    ///
    /// Returns true only for the call that removed the entry; concurrent or
    /// repeated calls for the same id return false.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let (events, task) = {
            let mut sessions = self.sessions.lock().await;
            let Some(entry) = sessions.get_mut(&id) else {
                return false;
            };
            let Some(task) = entry.task.take() else {
                tracing::debug!(connection_id = %id, "Teardown already in progress");
                return false;
            };
            entry.canceller.cancel();
            (entry.events.clone(), task)
        };

        // The session may already have stopped reading if its channel closed.
        let _ = events.send(ClientEvent::Disconnect).await;
        drop(events);

        match task.await {
            Ok(stats) => tracing::debug!(connection_id = %id, ?stats, "Session teardown complete"),
            Err(e) => tracing::error!(connection_id = %id, "Session task failed: {}", e),
        }

        self.remove(id).await
    }

    /// Drop the entry for `id`; unknown ids are a no-op
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.lock().await.remove(&id).is_some();
        if removed {
            tracing::debug!(connection_id = %id, "Session removed from registry");
        }
        removed
    }

    /// Disconnect every live session
    pub async fn shutdown(&self) {
        let ids: Vec<ConnectionId> = self.sessions.lock().await.keys().copied().collect();
        if ids.is_empty() {
            return;
        }

        tracing::info!("Closing {} active session(s)", ids.len());
        futures::future::join_all(ids.into_iter().map(|id| self.disconnect(id))).await;
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    fn spawn_session(&self, id: ConnectionId, notifier: Arc<dyn ClientNotifier>) -> SessionEntry {
        let (events, rx) = mpsc::channel(self.settings.event_buffer());
        let session = StreamSession::new(
            id,
            self.launcher.clone(),
            notifier,
            self.metrics.clone(),
            self.settings.clone(),
        );

        SessionEntry {
            events,
            canceller: session.canceller(),
            task: Some(tokio::spawn(session.run(rx))),
        }
    }
}
