//! Error classification for admission requests

use thiserror::Error;

use crate::image::ImageError;
use crate::store::StoreError;

/// Reasons an admission request is rejected
///
/// Opting out and already-injected pods are not errors; they produce an
/// allowed response without a patch.
#[derive(Debug, Error)]
pub enum InjectError {
    /// The admission object could not be decoded into a pod
    #[error("failed to decode pod: {0}")]
    Decode(String),

    /// The namespace does not reference a `OneAgentAPM` instance
    #[error("no OneAgentAPM instance set for namespace: {namespace}")]
    MissingBinding { namespace: String },

    /// The referenced `OneAgentAPM` does not exist
    #[error("OneAgentAPM {name} not found in namespace {namespace}")]
    ResourceNotFound { name: String, namespace: String },

    /// Any other failure reading from the object store
    #[error(transparent)]
    Store(StoreError),

    #[error("failed to build code modules image: {0}")]
    ImageBuild(#[from] ImageError),

    #[error("failed to mutate pod: {0}")]
    Mutation(String),

    #[error("failed to serialize patch: {0}")]
    Serialization(String),
}

impl InjectError {
    /// HTTP-style status code reported in the admission response
    pub fn status_code(&self) -> u16 {
        match self {
            InjectError::Decode(_) | InjectError::MissingBinding { .. } => 400,
            InjectError::ResourceNotFound { .. }
            | InjectError::Store(_)
            | InjectError::ImageBuild(_)
            | InjectError::Mutation(_)
            | InjectError::Serialization(_) => 500,
        }
    }

    /// Short machine-readable classification, used as a log and metric label
    pub fn kind(&self) -> &'static str {
        match self {
            InjectError::Decode(_) => "decode",
            InjectError::MissingBinding { .. } => "missing_binding",
            InjectError::ResourceNotFound { .. } => "resource_not_found",
            InjectError::Store(_) => "store",
            InjectError::ImageBuild(_) => "image_build",
            InjectError::Mutation(_) => "mutation",
            InjectError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for InjectError {
    fn from(e: serde_json::Error) -> Self {
        InjectError::Serialization(e.to_string())
    }
}
