//! OneAgent code module injection for Kubernetes pods
//!
//! This crate provides the core functionality for:
//! - The `OneAgentAPM` custom resource
//! - Annotation precedence and effective injection options
//! - Installer image resolution
//! - Pod mutation and JSON patch emission
//! - The admission webhook handler
//! - A client for the Dynatrace token API
//! - Metrics and structured logging

pub mod annotations;
pub mod crd;
pub mod dtclient;
pub mod error;
pub mod gate;
pub mod image;
pub mod mutator;
pub mod observability;
pub mod options;
pub mod patch;
pub mod store;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use crd::{OneAgentAPM, OneAgentAPMSpec, OneAgentProxy};
pub use error::InjectError;
pub use image::{ImageBuilder, ImagePolicy, RegistryImageBuilder};
pub use observability::{StructuredLogger, WebhookMetrics};
pub use store::{KubeStore, ObjectStore, StoreError};
pub use webhook::PodInjector;
