//! HTTP API: admission endpoint, liveness and Prometheus metrics

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use injector_lib::{webhook::inject_handler, PodInjector};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Liveness probe; the webhook has no readiness state of its own
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(injector: Arc<PodInjector>) -> Router {
    Router::new()
        .route("/inject", post(inject_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(injector)
}

/// Start the API server, terminating TLS when a certificate is given
pub async fn serve(
    port: u16,
    tls: Option<(String, String)>,
    injector: Arc<PodInjector>,
) -> anyhow::Result<()> {
    let app = create_router(injector);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    match tls {
        Some((cert, key)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .with_context(|| format!("loading TLS certificate {} and key {}", cert, key))?;

            info!(addr = %addr, "Starting webhook server with TLS");
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await
                .context("webhook server failed")?;
        }
        None => {
            info!(addr = %addr, "Starting webhook server");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            axum::serve(listener, app)
                .await
                .context("webhook server failed")?;
        }
    }

    Ok(())
}
