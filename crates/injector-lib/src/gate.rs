//! Injection gate
//!
//! Decides whether a pod is mutated at all. Lookups are read-only and the
//! pod is never touched here.

use std::fmt;

use k8s_openapi::api::core::v1::{Namespace, Pod};

use crate::annotations::{
    resolve, ANNOTATION_INJECT, ANNOTATION_INJECTED, DEFAULT_INJECT, LABEL_INSTANCE,
};
use crate::crd::OneAgentAPM;
use crate::error::InjectError;
use crate::store::{ObjectStore, StoreError};

/// Why a pod is let through untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Inject flag resolved to `"false"`
    OptedOut,
    /// Pod already carries the injected marker
    AlreadyInjected,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OptedOut => "opted_out",
            SkipReason::AlreadyInjected => "already_injected",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace and `OneAgentAPM` a pod is injected with
#[derive(Debug, Clone)]
pub struct Binding {
    pub namespace: Namespace,
    pub config: OneAgentAPM,
}

#[derive(Debug, Clone)]
pub enum GateDecision {
    Inject(Binding),
    Skip(SkipReason),
}

/// Load the namespace and its bound `OneAgentAPM`, then decide.
///
/// `config_namespace` is where `OneAgentAPM` objects live (the operator's
/// namespace).
pub async fn evaluate(
    store: &dyn ObjectStore,
    pod: &Pod,
    pod_namespace: &str,
    config_namespace: &str,
) -> Result<GateDecision, InjectError> {
    let namespace = store
        .namespace(pod_namespace)
        .await
        .map_err(InjectError::Store)?;

    let instance = instance_name(&namespace).ok_or_else(|| InjectError::MissingBinding {
        namespace: pod_namespace.to_string(),
    })?;

    let config = store
        .config(&instance, config_namespace)
        .await
        .map_err(|e| match e {
            StoreError::NotFound { .. } => InjectError::ResourceNotFound {
                name: instance.clone(),
                namespace: config_namespace.to_string(),
            },
            other => InjectError::Store(other),
        })?;

    Ok(match skip_reason(pod, &namespace) {
        Some(reason) => GateDecision::Skip(reason),
        None => GateDecision::Inject(Binding { namespace, config }),
    })
}

/// Name of the `OneAgentAPM` the namespace is bound to
pub fn instance_name(namespace: &Namespace) -> Option<String> {
    namespace
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_INSTANCE))
        .filter(|name| !name.is_empty())
        .cloned()
}

/// Opt-out and idempotency checks, in that order
pub fn skip_reason(pod: &Pod, namespace: &Namespace) -> Option<SkipReason> {
    let pod_annotations = pod.metadata.annotations.as_ref();

    let inject = resolve(
        ANNOTATION_INJECT,
        pod_annotations,
        namespace.metadata.annotations.as_ref(),
        DEFAULT_INJECT,
    );
    if inject == "false" {
        return Some(SkipReason::OptedOut);
    }

    if is_injected(pod) {
        return Some(SkipReason::AlreadyInjected);
    }

    None
}

pub fn is_injected(pod: &Pod) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_INJECTED))
        .is_some_and(|v| v == "true")
}
