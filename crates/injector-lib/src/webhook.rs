//! Pod injection webhook
//!
//! Handles AdmissionReview requests for pods. Every request runs the same
//! linear pipeline:
//! 1. Decode the pod from the admission object
//! 2. Load the namespace and its bound `OneAgentAPM`, check opt-out and
//!    earlier injection
//! 3. Resolve options and the installer image
//! 4. Mutate a copy of the pod
//! 5. Diff it against the admitted object and answer with a JSON patch
//!
//! Failures are always answered with `allowed: false`; a pod is never let
//! through uninjected without reporting why.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use json_patch::Patch;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::InjectError;
use crate::gate::{self, GateDecision, SkipReason};
use crate::image::{
    resolve_image, ImageBuilder, ImagePolicy, ImageSource, RegistryImageBuilder, ResolvedImage,
};
use crate::mutator;
use crate::observability::{StructuredLogger, WebhookMetrics};
use crate::options::EffectiveOptions;
use crate::patch;
use crate::store::ObjectStore;

/// Result of a request that was not rejected
#[derive(Debug, Clone)]
pub enum InjectionOutcome {
    Unmodified(SkipReason),
    Mutated { patch: Patch, image: ResolvedImage },
}

/// Admission handler injecting the code modules into pods
///
/// All collaborators are bound at construction; the injector holds no
/// per-request state and is shared across concurrent requests.
pub struct PodInjector {
    store: Arc<dyn ObjectStore>,
    image_builder: Arc<dyn ImageBuilder>,
    /// Image of the webhook's own container
    webhook_image: String,
    /// Namespace holding the `OneAgentAPM` objects
    namespace: String,
    image_policy: ImagePolicy,
    logger: StructuredLogger,
    metrics: WebhookMetrics,
}

impl PodInjector {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        webhook_image: impl Into<String>,
        namespace: impl Into<String>,
        logger: StructuredLogger,
        metrics: WebhookMetrics,
    ) -> Self {
        Self {
            store,
            image_builder: Arc::new(RegistryImageBuilder),
            webhook_image: webhook_image.into(),
            namespace: namespace.into(),
            image_policy: ImagePolicy::default(),
            logger,
            metrics,
        }
    }

    pub fn with_image_builder(mut self, builder: Arc<dyn ImageBuilder>) -> Self {
        self.image_builder = builder;
        self
    }

    pub fn with_image_policy(mut self, policy: ImagePolicy) -> Self {
        self.image_policy = policy;
        self
    }

    /// Answer an admission request
    pub async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let started = Instant::now();
        let namespace = request.namespace.clone().unwrap_or_default();

        let response = match self.inject(request).await {
            Ok(InjectionOutcome::Unmodified(reason)) => {
                self.logger
                    .log_injection_skipped(&request.uid, &namespace, reason.as_str());
                self.metrics.inc_skipped(reason.as_str());
                AdmissionResponse::from(request)
            }
            Ok(InjectionOutcome::Mutated { patch, image }) => {
                let patch_ops = patch.0.len();
                match AdmissionResponse::from(request).with_patch(patch) {
                    Ok(response) => {
                        self.logger.log_pod_injected(
                            &request.uid,
                            &namespace,
                            &image.image,
                            image_source_name(image.source),
                            patch_ops,
                        );
                        self.metrics.inc_injected();
                        response
                    }
                    Err(e) => {
                        self.reject(request, InjectError::Serialization(e.to_string()))
                    }
                }
            }
            Err(err) => self.reject(request, err),
        };

        self.metrics
            .observe_admission_latency(started.elapsed().as_secs_f64());
        response
    }

    /// Run the injection pipeline without building a response
    pub async fn inject(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<InjectionOutcome, InjectError> {
        let object = request.object.as_ref().ok_or_else(|| {
            InjectError::Decode("admission request carries no object".to_string())
        })?;
        let (pod, original) = decode_pod(object)?;

        let namespace = request
            .namespace
            .clone()
            .or_else(|| pod.metadata.namespace.clone())
            .ok_or_else(|| InjectError::Decode("pod namespace unknown".to_string()))?;

        self.logger.log_injection_started(
            &request.uid,
            pod.metadata.name.as_deref().unwrap_or_default(),
            pod.metadata.generate_name.as_deref().unwrap_or_default(),
            &namespace,
        );

        let decision =
            gate::evaluate(self.store.as_ref(), &pod, &namespace, &self.namespace).await?;
        let binding = match decision {
            GateDecision::Skip(reason) => return Ok(InjectionOutcome::Unmodified(reason)),
            GateDecision::Inject(binding) => binding,
        };

        let options = EffectiveOptions::resolve(
            pod.metadata.annotations.as_ref(),
            binding.namespace.metadata.annotations.as_ref(),
        );
        let config = &binding.config.spec;

        let image = resolve_image(
            config,
            &options,
            &self.webhook_image,
            self.image_policy,
            self.image_builder.as_ref(),
        )
        .map_err(|e| {
            self.metrics.inc_image_build_failures();
            InjectError::from(e)
        })?;
        debug!(uid = %request.uid, image = %image.image, "Resolved installer image");

        let mutated = mutator::mutate(&pod, &options, &image, config)?;
        let patch = patch::emit(&original, &mutated)?;

        Ok(InjectionOutcome::Mutated { patch, image })
    }

    fn reject(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        err: InjectError,
    ) -> AdmissionResponse {
        let code = err.status_code();
        self.logger.log_injection_failed(
            &request.uid,
            request.namespace.as_deref().unwrap_or_default(),
            err.kind(),
            code,
            &err.to_string(),
        );
        self.metrics.inc_rejected(err.kind());

        let mut response = AdmissionResponse::from(request).deny(err.to_string());
        response.result.code = code;
        response
    }
}

/// Decode the admitted object into a pod, keeping the document it came from
pub fn decode_pod(object: &DynamicObject) -> Result<(Pod, Value), InjectError> {
    let original =
        serde_json::to_value(object).map_err(|e| InjectError::Decode(e.to_string()))?;
    let pod = serde_json::from_value(original.clone())
        .map_err(|e| InjectError::Decode(e.to_string()))?;
    Ok((pod, original))
}

fn image_source_name(source: ImageSource) -> &'static str {
    match source {
        ImageSource::InstallerUrl => "installer_url",
        ImageSource::Annotation => "annotation",
        ImageSource::Resource => "resource",
        ImageSource::Built => "built",
        ImageSource::WebhookOverride => "webhook",
    }
}

/// axum handler for `POST /inject`
pub async fn inject_handler(
    State(injector): State<Arc<PodInjector>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(injector.handle(&request).await.into_review())
}
