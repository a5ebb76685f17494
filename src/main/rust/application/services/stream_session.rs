use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::domain::entities::SessionLifecycle;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    ClientNotifier, DropReason, ExitReceiver, MetricsReporter, TranscoderLauncher,
    TranscoderProcess,
};
use crate::domain::value_objects::{
    ClientEvent, ConnectionId, Destination, ErrorKind, ExitReport, ServerEvent, SessionState,
};

/// Per-session tuning shared by every session of a registry
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    stop_timeout: Duration,
    event_buffer: usize,
}

impl SessionSettings {
    pub fn new(stop_timeout: Duration, event_buffer: usize) -> Result<Self> {
        if event_buffer == 0 {
            return Err(DomainError::InvalidBufferCapacity);
        }

        Ok(Self {
            stop_timeout,
            event_buffer,
        })
    }

    /// How long a reconfigure waits for the previous transcoder to exit
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Capacity of the inbound event channel of one session
    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(7),
            event_buffer: 64,
        }
    }
}

/// Counters for one session, logged at teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub transcoders_started: u64,
    pub chunks_forwarded: u64,
    pub bytes_forwarded: u64,
    pub chunks_dropped_not_streaming: u64,
    pub chunks_dropped_backpressure: u64,
}

/// Tears a session down from outside its task, even while it is waiting on
/// a transcoder
#[derive(Clone)]
pub struct SessionCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl SessionCanceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

struct ActiveTranscoder {
    process: Box<dyn TranscoderProcess>,
    exit: ExitReceiver,
}

/// State machine for one client connection.
///
/// Owns at most one transcoder at a time. All methods take `&mut self`, so a
/// session confined to one task (see [`StreamSession::run`]) handles its
/// events strictly one after another.
pub struct StreamSession {
    id: ConnectionId,
    lifecycle: SessionLifecycle,
    destination: Option<Destination>,
    transcoder: Option<ActiveTranscoder>,
    launcher: Arc<dyn TranscoderLauncher>,
    notifier: Arc<dyn ClientNotifier>,
    metrics: Arc<dyn MetricsReporter>,
    settings: SessionSettings,
    stats: SessionStats,
    congested: bool,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl StreamSession {
    pub fn new(
        id: ConnectionId,
        launcher: Arc<dyn TranscoderLauncher>,
        notifier: Arc<dyn ClientNotifier>,
        metrics: Arc<dyn MetricsReporter>,
        settings: SessionSettings,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            id,
            lifecycle: SessionLifecycle::new(),
            destination: None,
            transcoder: None,
            launcher,
            notifier,
            metrics,
            settings,
            stats: SessionStats::default(),
            congested: false,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller {
            tx: self.cancel_tx.clone(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.current_state()
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// Destination of the current (or last) transcoder
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Number of transcoder handles owned right now (0 or 1)
    pub fn process_count(&self) -> usize {
        usize::from(self.transcoder.is_some())
    }

    /// Chunks queued in the current transcoder's input
    pub fn pending_chunks(&self) -> usize {
        self.transcoder
            .as_ref()
            .map_or(0, |active| active.process.pending_chunks())
    }

    /// A transcoder is owned exactly in the states that require one.
    ///
    /// Holds between events. While `launch` is awaited the session is
    /// `Starting` without a handle yet.
    pub fn check_invariants(&self) {
        debug_assert_eq!(
            self.transcoder.is_some(),
            self.state().has_process(),
            "session {} owns {} transcoder(s) in state {}",
            self.id,
            self.process_count(),
            self.state()
        );
    }

    /// Drive the session until it terminates.
    ///
    /// A closed event channel counts as a disconnect.
    pub async fn run(mut self, mut events: mpsc::Receiver<ClientEvent>) -> SessionStats {
        self.metrics.report_session_opened();
        tracing::info!(connection_id = %self.id, "Session opened");

        while !self.state().is_terminal() {
            tokio::select! {
                event = events.recv() => {
                    let event = event.unwrap_or(ClientEvent::Disconnect);
                    self.handle(event).await;
                }
                report = self.wait_for_exit() => self.on_exit(report),
            }
        }

        self.metrics.report_session_closed();
        tracing::info!(
            connection_id = %self.id,
            transcoders_started = self.stats.transcoders_started,
            chunks_forwarded = self.stats.chunks_forwarded,
            bytes_forwarded = self.stats.bytes_forwarded,
            dropped_not_streaming = self.stats.chunks_dropped_not_streaming,
            dropped_backpressure = self.stats.chunks_dropped_backpressure,
            "Session closed"
        );

        self.stats
    }

    /// Apply one inbound event
    pub async fn handle(&mut self, event: ClientEvent) {
        if self.state().is_terminal() {
            tracing::debug!(
                connection_id = %self.id,
                event = event.name(),
                "Ignoring event for terminated session"
            );
            return;
        }

        match event {
            ClientEvent::Configure {
                stream_url,
                stream_key,
            } => self.configure(stream_url, stream_key).await,
            ClientEvent::Chunk(chunk) => self.forward_chunk(chunk),
            ClientEvent::Stop => self.stop(),
            ClientEvent::Disconnect => self.disconnect(),
        }

        self.check_invariants();
    }

    /// Resolves when the current transcoder exits; pending while there is none
    pub async fn wait_for_exit(&mut self) -> ExitReport {
        match self.transcoder.as_mut() {
            Some(active) => (&mut active.exit).await.unwrap_or_default(),
            None => std::future::pending().await,
        }
    }

    /// Apply the exit notification of the current transcoder
    pub fn on_exit(&mut self, report: ExitReport) {
        let Some(active) = self.transcoder.take() else {
            return;
        };
        let pid = active.process.pid();
        self.congested = false;

        if self.state() == SessionState::Stopping {
            tracing::info!(connection_id = %self.id, ?pid, "Transcoder {}", report);
            self.metrics.report_transcoder_released(false);
            self.transition(|lifecycle| lifecycle.transition_to_idle("transcoder stopped"));
        } else {
            tracing::warn!(
                connection_id = %self.id,
                ?pid,
                stderr = %report.stderr_tail.join(" | "),
                "Transcoder {} without a stop request",
                report
            );
            self.metrics.report_transcoder_released(true);
            self.transition(|lifecycle| {
                lifecycle.transition_to_idle(format!("transcoder {}", report))
            });
            let error = DomainError::UnexpectedExit(report);
            self.notifier
                .notify(ServerEvent::error(error.kind(), error_detail(&error)));
        }

        self.check_invariants();
    }

    async fn configure(&mut self, stream_url: String, stream_key: String) {
        if self.is_cancelled() {
            tracing::debug!(connection_id = %self.id, "Ignoring start request after cancel");
            return;
        }
        tracing::info!(connection_id = %self.id, "Received start stream request");

        // Validate before touching a running transcoder.
        let destination = match Destination::new(stream_url, stream_key) {
            Ok(destination) => destination,
            Err(e) => {
                tracing::warn!(connection_id = %self.id, "Rejected destination: {}", e);
                self.notifier.notify(ServerEvent::error(e.kind(), e.to_string()));
                return;
            }
        };

        if self.transcoder.is_some() {
            tracing::info!(
                connection_id = %self.id,
                "Transcoder already running, replacing it"
            );
            if !self.replace_transcoder().await {
                return;
            }
        }

        self.start(destination).await;
    }

    /// Stop the current transcoder and wait (bounded) for it to exit.
    ///
    /// Returns false when the session was cancelled during the wait; the
    /// session is then terminated and nothing new may be spawned.
    async fn replace_transcoder(&mut self) -> bool {
        if self.state() != SessionState::Stopping {
            self.transition(|lifecycle| lifecycle.transition_to_stopping("reconfigure"));
        }

        let timeout = self.settings.stop_timeout;
        let mut cancelled = false;
        if let Some(active) = self.transcoder.as_mut() {
            active.process.stop();
            tokio::select! {
                result = tokio::time::timeout(timeout, &mut active.exit) => match result {
                    Ok(Ok(report)) => {
                        tracing::info!(connection_id = %self.id, "Previous transcoder {}", report)
                    }
                    Ok(Err(_)) => tracing::debug!(
                        connection_id = %self.id,
                        "Previous transcoder exit notification lost"
                    ),
                    Err(_) => tracing::warn!(
                        connection_id = %self.id,
                        "Previous transcoder did not exit within {:?}, releasing handle",
                        timeout
                    ),
                },
                _ = wait_cancelled(&mut self.cancel_rx) => cancelled = true,
            }
        }

        self.transcoder = None;
        self.metrics.report_transcoder_released(false);

        if cancelled {
            tracing::info!(
                connection_id = %self.id,
                "Session cancelled while replacing transcoder"
            );
            self.transition(|lifecycle| lifecycle.transition_to_terminated("cancelled"));
            return false;
        }

        self.transition(|lifecycle| lifecycle.transition_to_idle("replaced by reconfigure"));
        true
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    async fn start(&mut self, destination: Destination) {
        self.transition(|lifecycle| lifecycle.transition_to_starting());
        tracing::info!(
            connection_id = %self.id,
            destination = %destination.redacted_url(),
            "Starting transcoder"
        );

        match self.launcher.launch(&destination).await {
            Ok(launched) => {
                let pid = launched.process.pid();
                self.transcoder = Some(ActiveTranscoder {
                    process: launched.process,
                    exit: launched.exit,
                });
                self.destination = Some(destination);
                self.congested = false;
                self.stats.transcoders_started += 1;
                self.metrics.report_transcoder_started();
                self.transition(|lifecycle| lifecycle.transition_to_streaming());
                self.notifier.notify(ServerEvent::Ready);
                tracing::info!(connection_id = %self.id, ?pid, "Sent stream ready to client");
            }
            Err(e) => {
                tracing::error!(connection_id = %self.id, "Failed to start transcoder: {}", e);
                self.metrics.report_spawn_failure();
                self.transition(|lifecycle| lifecycle.transition_to_idle("spawn failed"));
                self.notifier.notify(ServerEvent::error(e.kind(), e.to_string()));
            }
        }
    }

    fn forward_chunk(&mut self, chunk: Bytes) {
        if !self.state().is_streaming() {
            self.stats.chunks_dropped_not_streaming += 1;
            self.metrics.report_chunk_dropped(DropReason::NotStreaming);
            tracing::trace!(
                connection_id = %self.id,
                state = %self.state(),
                "Dropping chunk while not streaming"
            );
            return;
        }
        let Some(active) = self.transcoder.as_mut() else {
            return;
        };

        let len = chunk.len();
        match active.process.feed(chunk) {
            Ok(()) => {
                self.congested = false;
                self.stats.chunks_forwarded += 1;
                self.stats.bytes_forwarded += len as u64;
                self.metrics.report_chunk_forwarded(len);
            }
            Err(DomainError::Backpressure) => {
                self.stats.chunks_dropped_backpressure += 1;
                self.metrics.report_chunk_dropped(DropReason::Backpressure);
                if !self.congested {
                    self.congested = true;
                    tracing::warn!(
                        connection_id = %self.id,
                        pending = active.process.pending_chunks(),
                        "Transcoder input queue full, dropping chunks"
                    );
                    self.notifier.notify(ServerEvent::error(
                        ErrorKind::Backpressure,
                        "transcoder input queue is full; chunks are being dropped",
                    ));
                }
            }
            Err(e) => {
                // Input already closed; the exit notification follows.
                self.stats.chunks_dropped_not_streaming += 1;
                self.metrics.report_chunk_dropped(DropReason::NotStreaming);
                tracing::debug!(connection_id = %self.id, "Chunk not written: {}", e);
            }
        }
    }

    fn stop(&mut self) {
        match self.state() {
            SessionState::Starting | SessionState::Streaming => {
                tracing::info!(
                    connection_id = %self.id,
                    "Received stop stream, stopping transcoder"
                );
                self.transition(|lifecycle| lifecycle.transition_to_stopping("stop requested"));
                if let Some(active) = self.transcoder.as_mut() {
                    active.process.stop();
                }
            }
            state => tracing::debug!(connection_id = %self.id, %state, "Stop ignored"),
        }
    }

    fn disconnect(&mut self) {
        tracing::info!(connection_id = %self.id, "Client disconnected");

        if let Some(mut active) = self.transcoder.take() {
            active.process.stop();
            self.metrics.report_transcoder_released(false);
            tracing::info!(
                connection_id = %self.id,
                pid = ?active.process.pid(),
                "Stopped transcoder on disconnect"
            );
        }

        self.transition(|lifecycle| lifecycle.transition_to_terminated("client disconnected"));
    }

    fn transition(&mut self, apply: impl FnOnce(&mut SessionLifecycle) -> Result<()>) {
        let from = self.state();
        let result = apply(&mut self.lifecycle);
        debug_assert!(result.is_ok(), "session state machine violated: {:?}", result);

        match result {
            Ok(()) => tracing::debug!(
                connection_id = %self.id,
                %from,
                to = %self.state(),
                "Session state changed"
            ),
            Err(e) => tracing::error!(connection_id = %self.id, "{}", e),
        }
    }
}

/// Resolves once the session's canceller fires
async fn wait_cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    while !*cancel_rx.borrow_and_update() {
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn error_detail(error: &DomainError) -> String {
    match error {
        DomainError::UnexpectedExit(report) => report.detail(),
        other => other.to_string(),
    }
}
