use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::application::services::SessionSettings;
use crate::domain::value_objects::EncoderProfile;
use crate::infrastructure::ffmpeg::TranscoderSettings;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pipeline-ws-to-rtmp",
    version = "0.1.0",
    author = "Hawkeye Video Pipeline",
    about = "WebSocket to RTMP relay transcoding browser media with ffmpeg"
)]
pub struct Config {
    /// WebSocket listen port
    #[arg(long, env = "RELAY_PORT", default_value = "8001")]
    pub listen_port: u16,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9003")]
    pub metrics_port: u16,

    /// Path to the ffmpeg executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// Media chunks queued per transcoder before new chunks are dropped
    #[arg(long, env = "CHUNK_BUFFER", default_value = "100")]
    pub chunk_buffer: usize,

    /// Client events queued per session
    #[arg(long, env = "EVENT_BUFFER", default_value = "64")]
    pub event_buffer: usize,

    /// Seconds between the interrupt and the forced kill of a transcoder
    #[arg(long, env = "STOP_GRACE_SECS", default_value = "5")]
    pub stop_grace_secs: u64,

    /// Transcoder stderr lines kept for error reports
    #[arg(long, env = "STDERR_TAIL_LINES", default_value = "20")]
    pub stderr_tail_lines: usize,

    /// Largest accepted WebSocket message in bytes
    #[arg(long, env = "MAX_MESSAGE_BYTES", default_value = "8388608")]
    pub max_message_bytes: usize,

    /// Output frame rate
    #[arg(long, env = "FRAME_RATE", default_value = "25")]
    pub frame_rate: u32,

    /// x264 constant rate factor
    #[arg(long, env = "VIDEO_CRF", default_value = "25")]
    pub crf: u8,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

/// Extra time a reconfigure waits beyond the transcoder's grace period
const STOP_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_port(self.listen_port, "listen")?;
        Self::validate_port(self.metrics_port, "metrics")?;

        if self.listen_port == self.metrics_port {
            anyhow::bail!(
                "Listen and metrics ports must differ (both are {})",
                self.listen_port
            );
        }

        if self.ffmpeg_path.as_os_str().is_empty() {
            anyhow::bail!("ffmpeg path cannot be empty");
        }

        if self.chunk_buffer == 0 {
            anyhow::bail!("Chunk buffer cannot be 0");
        }

        if self.event_buffer == 0 {
            anyhow::bail!("Event buffer cannot be 0");
        }

        if self.stop_grace_secs == 0 {
            anyhow::bail!("Stop grace period cannot be 0");
        }

        if self.stderr_tail_lines == 0 {
            anyhow::bail!("Stderr tail must keep at least one line");
        }

        if self.max_message_bytes == 0 {
            anyhow::bail!("Maximum message size cannot be 0");
        }

        if self.frame_rate == 0 {
            anyhow::bail!("Frame rate cannot be 0");
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn to_encoder_profile(&self) -> crate::domain::errors::Result<EncoderProfile> {
        EncoderProfile::new(self.frame_rate, self.crf)
    }

    pub fn to_transcoder_settings(&self) -> crate::domain::errors::Result<TranscoderSettings> {
        TranscoderSettings::new(self.chunk_buffer, self.stop_grace(), self.stderr_tail_lines)
    }

    pub fn to_session_settings(&self) -> crate::domain::errors::Result<SessionSettings> {
        SessionSettings::new(self.stop_grace() + STOP_TIMEOUT_MARGIN, self.event_buffer)
    }
}
