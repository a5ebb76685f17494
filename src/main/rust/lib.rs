pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    SessionCanceller, SessionHandle, SessionRegistry, SessionSettings, SessionStats,
    StreamSession,
};
pub use config::Config;
pub use domain::entities::{SessionLifecycle, StateTransition};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{ClientNotifier, MetricsReporter, TranscoderLauncher, TranscoderProcess};
pub use domain::value_objects::{
    ClientEvent, ConnectionId, Destination, EncoderProfile, ErrorKind, ExitReport, ServerEvent,
    SessionState,
};
pub use infrastructure::ffmpeg::{FfmpegLauncher, TranscoderSettings};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::websocket::relay_routes;
