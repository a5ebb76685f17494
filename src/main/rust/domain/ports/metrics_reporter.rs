/// Why a chunk did not reach the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Arrived while the session was not streaming
    NotStreaming,
    /// Transcoder input queue was full
    Backpressure,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStreaming => "not_streaming",
            Self::Backpressure => "backpressure",
        }
    }
}

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_session_opened(&self);
    fn report_session_closed(&self);
    fn report_transcoder_started(&self);
    fn report_transcoder_released(&self, unexpected: bool);
    fn report_spawn_failure(&self);
    fn report_chunk_forwarded(&self, bytes: usize);
    fn report_chunk_dropped(&self, reason: DropReason);
}
