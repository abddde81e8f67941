//! Read access to cluster objects
//!
//! The webhook reads the pod's namespace and the bound `OneAgentAPM` fresh
//! on every request. Nothing is cached between requests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::{Api, Client};
use thiserror::Error;
use tracing::debug;

use crate::crd::OneAgentAPM;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    #[error("object store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    fn from_kube(kind: &'static str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound {
                kind,
                name: name.to_string(),
            },
            other => StoreError::Kube(other),
        }
    }
}

/// Object store reader used by the webhook
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a namespace by name
    async fn namespace(&self, name: &str) -> Result<Namespace, StoreError>;

    /// Fetch a `OneAgentAPM` from the given namespace
    async fn config(&self, name: &str, namespace: &str) -> Result<OneAgentAPM, StoreError>;

    /// Fetch a pod; used once at startup to find the webhook's own image
    async fn pod(&self, name: &str, namespace: &str) -> Result<Pod, StoreError>;
}

/// Object store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn namespace(&self, name: &str) -> Result<Namespace, StoreError> {
        debug!(namespace = %name, "Fetching namespace");
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| StoreError::from_kube("Namespace", name, e))
    }

    async fn config(&self, name: &str, namespace: &str) -> Result<OneAgentAPM, StoreError> {
        debug!(name = %name, namespace = %namespace, "Fetching OneAgentAPM");
        let api: Api<OneAgentAPM> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| StoreError::from_kube("OneAgentAPM", name, e))
    }

    async fn pod(&self, name: &str, namespace: &str) -> Result<Pod, StoreError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| StoreError::from_kube("Pod", name, e))
    }
}

/// Image of the first container of the given pod
///
/// The webhook runs this once at startup against its own pod.
pub async fn own_image(
    store: &dyn ObjectStore,
    pod_name: &str,
    namespace: &str,
) -> Result<String, StoreError> {
    let pod = store.pod(pod_name, namespace).await?;
    pod.spec
        .and_then(|spec| spec.containers.into_iter().next())
        .and_then(|c| c.image)
        .filter(|image| !image.is_empty())
        .ok_or_else(|| StoreError::Backend(format!("pod {} has no container image", pod_name)))
}
