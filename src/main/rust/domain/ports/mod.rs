mod client_notifier;
mod metrics_reporter;
mod transcoder;

pub use client_notifier::ClientNotifier;
pub use metrics_reporter::{DropReason, MetricsReporter};
pub use transcoder::{ExitReceiver, LaunchedTranscoder, TranscoderLauncher, TranscoderProcess};
