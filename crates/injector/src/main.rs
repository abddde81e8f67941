//! OneAgent injector - mutating admission webhook
//!
//! Runs as a Deployment in the operator namespace and injects the OneAgent
//! code modules into pods of namespaces bound to a `OneAgentAPM`.

use anyhow::{Context, Result};
use injector_lib::{
    store::{own_image, KubeStore},
    ObjectStore, PodInjector, StructuredLogger, WebhookMetrics,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const WEBHOOK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting oneagent-injector");

    let config = config::WebhookConfig::load()?;
    info!(
        namespace = %config.namespace,
        port = config.port,
        image_policy = ?config.image_policy,
        "Webhook configured"
    );

    let client = kube::Client::try_default()
        .await
        .context("creating kubernetes client")?;
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client));

    let webhook_image = match config.image.clone().filter(|i| !i.is_empty()) {
        Some(image) => image,
        None => {
            if config.pod_name.is_empty() {
                info!("No pod name set for webhook container");
            }
            own_image(store.as_ref(), &config.pod_name, &config.namespace)
                .await
                .context("looking up the webhook's own image")?
        }
    };

    let instance = if config.pod_name.is_empty() {
        "oneagent-injector".to_string()
    } else {
        config.pod_name.clone()
    };
    let logger = StructuredLogger::new(instance);
    logger.log_startup(WEBHOOK_VERSION, &webhook_image, &config.namespace);

    let metrics = WebhookMetrics::new();

    let injector = Arc::new(
        PodInjector::new(
            store,
            webhook_image,
            config.namespace.clone(),
            logger.clone(),
            metrics,
        )
        .with_image_policy(config.image_policy),
    );

    let tls = config
        .tls_paths()
        .map(|(cert, key)| (cert.to_string(), key.to_string()));

    tokio::select! {
        result = api::serve(config.port, tls, injector) => {
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
