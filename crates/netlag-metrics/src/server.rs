//! HTTP scrape endpoint.

use std::future::Future;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

use crate::gauges::LatencyGauges;
use crate::prometheus::render_prometheus;

/// Path the gauges are exposed on.
pub const METRICS_PATH: &str = "/metrics";

/// Build the scrape router.
pub fn metrics_router(gauges: LatencyGauges) -> Router {
    Router::new()
        .route(METRICS_PATH, get(prometheus_metrics))
        .with_state(gauges)
}

/// Serve the scrape endpoint on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, gauges: LatencyGauges, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, path = METRICS_PATH, "metrics server starting");

    axum::serve(listener, metrics_router(gauges))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!(%addr, "metrics server stopped");
    Ok(())
}

async fn prometheus_metrics(State(gauges): State<LatencyGauges>) -> impl IntoResponse {
    let body = render_prometheus(&gauges.samples().await);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
