//! Webhook configuration

use anyhow::{Context, Result};
use injector_lib::ImagePolicy;
use serde::Deserialize;

/// Webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Port for the admission, health and metrics endpoints
    #[serde(default = "default_port")]
    pub port: u16,

    /// Namespace holding the `OneAgentAPM` objects
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the webhook's own pod, from the downward API
    #[serde(default = "default_pod_name")]
    pub pod_name: String,

    /// Webhook image; when unset it is read from the webhook's own pod
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub image_policy: ImagePolicy,

    #[serde(default)]
    pub tls_cert_path: Option<String>,

    #[serde(default)]
    pub tls_key_path: Option<String>,
}

fn default_port() -> u16 {
    8443
}

fn default_namespace() -> String {
    std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "dynatrace".to_string())
}

fn default_pod_name() -> String {
    std::env::var("POD_NAME").unwrap_or_default()
}

impl WebhookConfig {
    /// Load configuration from `WEBHOOK_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WEBHOOK"))
            .build()
            .context("reading webhook configuration")?;

        config
            .try_deserialize()
            .context("invalid webhook configuration")
    }

    /// Certificate and key paths, when both are configured
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (self.tls_cert_path.as_deref(), self.tls_key_path.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((cert, key)),
            _ => None,
        }
    }
}
