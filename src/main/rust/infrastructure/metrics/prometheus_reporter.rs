use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::ports::{DropReason, MetricsReporter};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::new(
        "relay_active_sessions",
        "Number of connected relay sessions"
    ).expect("metric can be created");

    pub static ref ACTIVE_TRANSCODERS: IntGauge = IntGauge::new(
        "relay_active_transcoders",
        "Number of transcoder processes owned by sessions"
    ).expect("metric can be created");

    pub static ref TRANSCODER_SPAWNS: IntCounter = IntCounter::new(
        "relay_transcoder_spawns_total",
        "Total transcoder processes started"
    ).expect("metric can be created");

    pub static ref SPAWN_FAILURES: IntCounter = IntCounter::new(
        "relay_transcoder_spawn_failures_total",
        "Total transcoder spawn attempts that failed"
    ).expect("metric can be created");

    pub static ref UNEXPECTED_EXITS: IntCounter = IntCounter::new(
        "relay_transcoder_unexpected_exits_total",
        "Total transcoders that exited without a stop request"
    ).expect("metric can be created");

    pub static ref CHUNKS_FORWARDED: IntCounter = IntCounter::new(
        "relay_chunks_forwarded_total",
        "Total media chunks queued for a transcoder"
    ).expect("metric can be created");

    pub static ref BYTES_FORWARDED: IntCounter = IntCounter::new(
        "relay_bytes_forwarded_total",
        "Total media bytes queued for a transcoder"
    ).expect("metric can be created");

    // reason: not_streaming | backpressure
    pub static ref CHUNKS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("relay_chunks_dropped_total", "Total media chunks dropped"),
        &["reason"]
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(ACTIVE_SESSIONS.clone()))?;
        REGISTRY.register(Box::new(ACTIVE_TRANSCODERS.clone()))?;
        REGISTRY.register(Box::new(TRANSCODER_SPAWNS.clone()))?;
        REGISTRY.register(Box::new(SPAWN_FAILURES.clone()))?;
        REGISTRY.register(Box::new(UNEXPECTED_EXITS.clone()))?;
        REGISTRY.register(Box::new(CHUNKS_FORWARDED.clone()))?;
        REGISTRY.register(Box::new(BYTES_FORWARDED.clone()))?;
        REGISTRY.register(Box::new(CHUNKS_DROPPED.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_session_opened(&self) {
        ACTIVE_SESSIONS.inc();
    }

    fn report_session_closed(&self) {
        ACTIVE_SESSIONS.dec();
    }

    fn report_transcoder_started(&self) {
        ACTIVE_TRANSCODERS.inc();
        TRANSCODER_SPAWNS.inc();
    }

    fn report_transcoder_released(&self, unexpected: bool) {
        ACTIVE_TRANSCODERS.dec();
        if unexpected {
            UNEXPECTED_EXITS.inc();
        }
    }

    fn report_spawn_failure(&self) {
        SPAWN_FAILURES.inc();
    }

    fn report_chunk_forwarded(&self, bytes: usize) {
        CHUNKS_FORWARDED.inc();
        BYTES_FORWARDED.inc_by(bytes as u64);
    }

    fn report_chunk_dropped(&self, reason: DropReason) {
        CHUNKS_DROPPED.with_label_values(&[reason.as_str()]).inc();
    }
}
