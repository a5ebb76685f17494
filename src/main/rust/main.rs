use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};

use pipeline_ws_to_rtmp::infrastructure::shutdown::ShutdownSignal;
use pipeline_ws_to_rtmp::{
    relay_routes, serve_metrics, Config, FfmpegLauncher, PrometheusReporter, SessionRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables take precedence
    dotenv().ok();

    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting WebSocket to RTMP relay");
    info!("  Listen port: {}", config.listen_port);
    info!("  Metrics port: {}", config.metrics_port);
    info!("  ffmpeg: {}", config.ffmpeg_path.display());
    info!("  Chunk buffer: {}", config.chunk_buffer);

    // Convert CLI config to domain configs
    let profile = config
        .to_encoder_profile()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let transcoder_settings = config
        .to_transcoder_settings()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let session_settings = config
        .to_session_settings()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Create infrastructure implementations (dependency injection)
    let launcher = Arc::new(FfmpegLauncher::new(
        config.ffmpeg_path.clone(),
        profile,
        transcoder_settings,
    ));
    let metrics_reporter = Arc::new(PrometheusReporter::new());

    // Create application service
    let registry = Arc::new(SessionRegistry::new(
        launcher,
        metrics_reporter,
        session_settings,
    ));

    // Set up graceful shutdown
    let (trigger, shutdown) = ShutdownSignal::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        trigger.trigger();
    });

    // Start metrics server; it outlives the relay to report draining
    let (metrics_stop, metrics_shutdown) = ShutdownSignal::channel();
    let metrics_server = tokio::spawn(serve_metrics(
        config.metrics_port,
        registry.clone(),
        shutdown.clone(),
        metrics_shutdown,
    ));

    // Serve the relay until shutdown
    let routes = relay_routes(registry.clone(), config.max_message_bytes);
    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
        ([0, 0, 0, 0], config.listen_port),
        shutdown.triggered(),
    );
    info!("Relay listening on ws://{}/ws", addr);
    server.await;

    // Stop every transcoder still owned by a session
    registry.shutdown().await;
    metrics_stop.trigger();

    if let Err(e) = metrics_server.await {
        error!("Metrics server task failed: {}", e);
    }

    info!("Relay shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
