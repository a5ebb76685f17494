use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use warp::http::StatusCode;
use warp::Filter;

use super::PrometheusReporter;
use crate::application::services::SessionRegistry;
use crate::infrastructure::shutdown::ShutdownSignal;

const SERVICE_NAME: &str = "pipeline-ws-to-rtmp";

/// Body of `/health` and `/readyz`
#[derive(Debug, Serialize)]
struct RelayStatus {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    active_sessions: usize,
}

impl RelayStatus {
    fn new(status: &'static str, active_sessions: usize) -> Self {
        Self {
            status,
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            active_sessions,
        }
    }
}

/// Serve until `stop` fires. `draining` only flips readiness, so health checks keep
/// answering while sessions are torn down.
pub async fn serve_metrics(
    port: u16,
    registry: Arc<SessionRegistry>,
    draining: ShutdownSignal,
    stop: ShutdownSignal,
) {
    let (addr, server) = warp::serve(routes(registry, draining))
        .bind_with_graceful_shutdown(([0, 0, 0, 0], port), stop.triggered());

    tracing::info!("Metrics server listening on http://{}", addr);
    server.await;
}

/// Prometheus scrape plus liveness and readiness checks.
///
/// `/readyz` turns 503 as soon as shutdown starts so load balancers stop
/// routing new sockets while existing sessions are torn down.
pub fn routes(
    registry: Arc<SessionRegistry>,
    shutdown: ShutdownSignal,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let with_registry = warp::any().map(move || registry.clone());
    let with_shutdown = warp::any().map(move || shutdown.clone());

    let metrics_route = warp::path("metrics").and(warp::path::end()).map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(with_registry.clone())
        .and_then(health);

    let liveness_route = warp::path("livez")
        .and(warp::path::end())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let readiness_route = warp::path("readyz")
        .and(warp::path::end())
        .and(with_registry)
        .and(with_shutdown)
        .and_then(readiness);

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .with(cors)
}

async fn health(registry: Arc<SessionRegistry>) -> Result<impl warp::Reply, Infallible> {
    let status = RelayStatus::new("healthy", registry.len().await);
    Ok(warp::reply::json(&status))
}

async fn readiness(
    registry: Arc<SessionRegistry>,
    shutdown: ShutdownSignal,
) -> Result<impl warp::Reply, Infallible> {
    let active_sessions = registry.len().await;
    let (status, code) = if shutdown.is_triggered() {
        ("shutting_down", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("ready", StatusCode::OK)
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&RelayStatus::new(status, active_sessions)),
        code,
    ))
}
