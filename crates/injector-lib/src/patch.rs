//! JSON patch generation
//!
//! The mutated pod is serialized and diffed against the document the API
//! server sent. Fields the typed `Pod` does not know are absent from the
//! mutated document, so the patch removes them. The API server drops unknown
//! fields on admission anyway.

use json_patch::Patch;
use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;

use crate::error::InjectError;

/// Compute the RFC 6902 patch turning `original` into `mutated`.
pub fn emit(original: &Value, mutated: &Pod) -> Result<Patch, InjectError> {
    let mutated = to_document(mutated)?;
    Ok(json_patch::diff(original, &mutated))
}

/// Serialize a pod the way it is diffed. Object keys come out sorted, so the
/// same pod always yields the same document.
pub fn to_document(pod: &Pod) -> Result<Value, InjectError> {
    serde_json::to_value(pod).map_err(|e| InjectError::Serialization(e.to_string()))
}
