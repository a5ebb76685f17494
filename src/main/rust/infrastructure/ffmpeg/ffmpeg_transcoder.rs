use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;

use super::{CommandBuilder, StderrTail, StdinPump};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{LaunchedTranscoder, TranscoderLauncher, TranscoderProcess};
use crate::domain::value_objects::{Destination, EncoderProfile, ExitReport};

/// Limits applied to every spawned transcoder
#[derive(Debug, Clone, PartialEq)]
pub struct TranscoderSettings {
    input_queue: usize,
    stop_grace: Duration,
    stderr_tail_lines: usize,
}

impl TranscoderSettings {
    pub fn new(input_queue: usize, stop_grace: Duration, stderr_tail_lines: usize) -> Result<Self> {
        if input_queue == 0 {
            return Err(DomainError::InvalidBufferCapacity);
        }

        Ok(Self {
            input_queue,
            stop_grace,
            stderr_tail_lines,
        })
    }

    /// Chunks buffered in front of stdin before new ones are dropped
    pub fn input_queue(&self) -> usize {
        self.input_queue
    }

    /// Time between the interrupt and the forced kill
    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    pub fn stderr_tail_lines(&self) -> usize {
        self.stderr_tail_lines
    }
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            input_queue: 100,
            stop_grace: Duration::from_secs(5),
            stderr_tail_lines: 20,
        }
    }
}

/// Spawns ffmpeg relaying stdin to an RTMP destination
pub struct FfmpegLauncher {
    program: PathBuf,
    profile: EncoderProfile,
    settings: TranscoderSettings,
}

impl FfmpegLauncher {
    pub fn new(
        program: impl Into<PathBuf>,
        profile: EncoderProfile,
        settings: TranscoderSettings,
    ) -> Self {
        Self {
            program: program.into(),
            profile,
            settings,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Wire up an already spawned child: input pump, stderr reader and the
    /// supervisor that reports the exit.
    fn attach(mut child: Child, settings: &TranscoderSettings) -> Result<LaunchedTranscoder> {
        let pid = child.id();
        let label = pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string());

        let stdin = child.stdin.take().ok_or_else(|| {
            DomainError::SpawnFailed("transcoder stdin was not captured".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            DomainError::SpawnFailed("transcoder stderr was not captured".to_string())
        })?;

        let pump = StdinPump::spawn(stdin, settings.input_queue, label.clone());
        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let exited = Arc::new(AtomicBool::new(false));

        tokio::spawn(supervise(
            child,
            stderr,
            stop_rx,
            exit_tx,
            exited.clone(),
            settings.clone(),
            label,
        ));

        Ok(LaunchedTranscoder {
            process: Box::new(FfmpegProcess {
                pid,
                pump,
                stop_tx: Some(stop_tx),
                exited,
            }),
            exit: exit_rx,
        })
    }
}

#[async_trait]
impl TranscoderLauncher for FfmpegLauncher {
    async fn launch(&self, destination: &Destination) -> Result<LaunchedTranscoder> {
        let args = CommandBuilder::build_args(&self.profile, destination);
        tracing::debug!(
            program = %self.program.display(),
            destination = %destination.redacted_url(),
            "Spawning transcoder"
        );

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::SpawnFailed(format!("{}: {}", self.program.display(), e)))?;

        let launched = Self::attach(child, &self.settings)?;
        tracing::info!(pid = ?launched.process.pid(), "Transcoder spawned");
        Ok(launched)
    }
}

/// Handle to one running ffmpeg process
pub struct FfmpegProcess {
    pid: Option<u32>,
    pump: StdinPump,
    stop_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
}

impl TranscoderProcess for FfmpegProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn feed(&mut self, chunk: Bytes) -> Result<()> {
        if self.stop_tx.is_none() || self.exited.load(Ordering::SeqCst) {
            return Err(DomainError::Terminated);
        }
        self.pump.push(chunk)
    }

    fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };

        self.pump.close();
        // The supervisor is gone once the process has exited.
        let _ = stop_tx.send(());
    }

    fn is_input_closed(&self) -> bool {
        self.pump.is_closed()
    }

    fn pending_chunks(&self) -> usize {
        self.pump.pending()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn supervise(
    mut child: Child,
    stderr: ChildStderr,
    stop_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ExitReport>,
    exited: Arc<AtomicBool>,
    settings: TranscoderSettings,
    label: String,
) {
    let tail_label = label.clone();
    let tail_lines = settings.stderr_tail_lines;
    let tail =
        tokio::spawn(async move { StderrTail::collect(stderr, tail_lines, &tail_label).await });

    let status = tokio::select! {
        status = child.wait() => status,
        // A dropped handle counts as a stop request as well.
        _ = stop_rx => {
            interrupt(&mut child, &label);
            match tokio::time::timeout(settings.stop_grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(
                        transcoder = %label,
                        "Transcoder still running {:?} after interrupt, killing it",
                        settings.stop_grace
                    );
                    if let Err(e) = child.kill().await {
                        tracing::error!(transcoder = %label, "Failed to kill transcoder: {}", e);
                    }
                    child.wait().await
                }
            }
        }
    };
    exited.store(true, Ordering::SeqCst);

    let stderr_tail = tail.await.unwrap_or_default();
    let report = match status {
        Ok(status) => exit_report(status),
        Err(e) => {
            tracing::error!(transcoder = %label, "Failed to wait for transcoder: {}", e);
            ExitReport::default()
        }
    }
    .with_stderr_tail(stderr_tail);

    tracing::info!(transcoder = %label, "Transcoder process closed: {}", report);
    let _ = exit_tx.send(report);
}

#[cfg(unix)]
fn interrupt(child: &mut Child, label: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        tracing::debug!(transcoder = %label, "Failed to interrupt transcoder: {}", e);
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child, label: &str) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(transcoder = %label, "Failed to stop transcoder: {}", e);
    }
}

fn exit_report(status: ExitStatus) -> ExitReport {
    if let Some(code) = status.code() {
        return ExitReport::with_code(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitReport::with_signal(signal);
        }
    }

    ExitReport::default()
}
