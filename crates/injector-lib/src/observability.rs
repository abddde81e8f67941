//! Observability for the injection webhook
//!
//! Provides:
//! - Prometheus metrics (admission outcomes, admission latency, image build failures)
//! - Structured logging of admission events through an explicit handle

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for admission latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<WebhookMetricsInner> = OnceLock::new();

struct WebhookMetricsInner {
    admissions: IntCounterVec,
    admission_latency_seconds: Histogram,
    image_build_failures: IntCounter,
}

impl WebhookMetricsInner {
    fn new() -> Self {
        Self {
            admissions: register_int_counter_vec!(
                "oneagent_webhook_admissions_total",
                "Admission requests handled, by outcome",
                &["outcome", "reason"]
            )
            .expect("Failed to register admissions_total"),

            admission_latency_seconds: register_histogram!(
                "oneagent_webhook_admission_latency_seconds",
                "Time spent handling an admission request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register admission_latency_seconds"),

            image_build_failures: register_int_counter!(
                "oneagent_webhook_image_build_failures_total",
                "Code modules image references that could not be built"
            )
            .expect("Failed to register image_build_failures_total"),
        }
    }
}

/// Handle to the webhook's Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct WebhookMetrics {
    _private: (),
}

impl Default for WebhookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(WebhookMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &WebhookMetricsInner {
        GLOBAL_METRICS.get_or_init(WebhookMetricsInner::new)
    }

    pub fn inc_injected(&self) {
        self.inner()
            .admissions
            .with_label_values(&["injected", ""])
            .inc();
    }

    pub fn inc_skipped(&self, reason: &str) {
        self.inner()
            .admissions
            .with_label_values(&["skipped", reason])
            .inc();
    }

    pub fn inc_rejected(&self, kind: &str) {
        self.inner()
            .admissions
            .with_label_values(&["rejected", kind])
            .inc();
    }

    pub fn inc_image_build_failures(&self) {
        self.inner().image_build_failures.inc();
    }

    pub fn observe_admission_latency(&self, duration_secs: f64) {
        self.inner().admission_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for admission events
///
/// Passed explicitly to the injector; every event carries the webhook
/// instance it came from.
#[derive(Clone)]
pub struct StructuredLogger {
    webhook: String,
}

impl StructuredLogger {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
        }
    }

    pub fn log_injection_started(
        &self,
        uid: &str,
        name: &str,
        generate_name: &str,
        namespace: &str,
    ) {
        info!(
            event = "injection_started",
            webhook = %self.webhook,
            uid = %uid,
            name = %name,
            generate_name = %generate_name,
            namespace = %namespace,
            "Injecting into pod"
        );
    }

    pub fn log_injection_skipped(&self, uid: &str, namespace: &str, reason: &str) {
        info!(
            event = "injection_skipped",
            webhook = %self.webhook,
            uid = %uid,
            namespace = %namespace,
            reason = %reason,
            "Pod left unmodified"
        );
    }

    pub fn log_pod_injected(
        &self,
        uid: &str,
        namespace: &str,
        image: &str,
        image_source: &str,
        patch_ops: usize,
    ) {
        info!(
            event = "pod_injected",
            webhook = %self.webhook,
            uid = %uid,
            namespace = %namespace,
            image = %image,
            image_source = %image_source,
            patch_ops = patch_ops,
            "Pod injected"
        );
    }

    pub fn log_injection_failed(
        &self,
        uid: &str,
        namespace: &str,
        kind: &str,
        code: u16,
        error: &str,
    ) {
        if code >= 500 {
            error!(
                event = "injection_failed",
                webhook = %self.webhook,
                uid = %uid,
                namespace = %namespace,
                kind = %kind,
                code = code,
                error = %error,
                "Injection failed"
            );
        } else {
            warn!(
                event = "injection_failed",
                webhook = %self.webhook,
                uid = %uid,
                namespace = %namespace,
                kind = %kind,
                code = code,
                error = %error,
                "Admission request rejected"
            );
        }
    }

    pub fn log_startup(&self, version: &str, image: &str, namespace: &str) {
        info!(
            event = "webhook_started",
            webhook = %self.webhook,
            version = %version,
            image = %image,
            namespace = %namespace,
            "Injection webhook started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "webhook_shutdown",
            webhook = %self.webhook,
            reason = %reason,
            "Injection webhook shutting down"
        );
    }
}
