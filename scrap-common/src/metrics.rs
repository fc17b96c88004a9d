use axum::{routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::health::HealthRegistry;

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

/// Build the operational router: an index, the liveness check and the Prometheus scrape endpoint.
pub fn setup_metrics_router(
    liveness: HealthRegistry,
    recorder_handle: PrometheusHandle,
) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_liveness", get(move || std::future::ready(liveness.get_status())))
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

pub async fn index() -> &'static str {
    "scrap worker"
}
