use std::future::Future;
use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use warp::Filter;

use crate::application::services::HealthStore;
use crate::infrastructure::metrics::PrometheusReporter;

/// Routes served by the health endpoint
pub fn routes(
    store: HealthStore,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let store = warp::any().map(move || store.clone());

    // Reads never block the watchdog: each request clones the latest snapshot
    let health_route = warp::path!("health")
        .or(warp::path::end())
        .unify()
        .and(store)
        .map(|store: HealthStore| warp::reply::json(&store.snapshot().report()));

    let metrics_route = warp::path!("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    // Liveness probe endpoint (minimal check - is the process running?)
    let liveness_route =
        warp::path!("livez").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    warp::get()
        .and(health_route.or(metrics_route).or(liveness_route))
        .with(cors)
}

/// Bind the health server on all interfaces.
///
/// Fails if the port cannot be bound; the returned future serves until
/// `shutdown` is cancelled.
pub fn bind(
    store: HealthStore,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    warp::serve(routes(store)).try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        shutdown.cancelled().await;
        tracing::debug!("Health server shutting down");
    })
}
