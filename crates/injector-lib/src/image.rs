//! Code modules image resolution
//!
//! Precedence when no installer URL is configured:
//! 1. image annotation on the pod (or its namespace)
//! 2. `spec.image` of the `OneAgentAPM`
//! 3. an image reference built for the environment's registry
//!
//! With an installer URL the init container runs the webhook's own image
//! and downloads the code modules itself.
//!
//! The builder gets flavor and technologies unescaped; only the installer
//! environment carries the query-escaped form.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::crd::OneAgentAPMSpec;
use crate::options::EffectiveOptions;

const CODEMODULES_REPOSITORY: &str = "linux/codemodules";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid API URL: {0}")]
    InvalidApiUrl(String),

    #[error("{0}")]
    Builder(String),
}

/// Builds a code modules image reference for an environment
pub trait ImageBuilder: Send + Sync {
    fn build(
        &self,
        api_url: &str,
        flavor: &str,
        technologies: &str,
        version: &str,
    ) -> Result<String, ImageError>;
}

/// Builds references into the environment's own registry:
/// `<api host>/linux/codemodules[-<flavor>]:<version|latest>[-<technology>...]`
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryImageBuilder;

impl ImageBuilder for RegistryImageBuilder {
    fn build(
        &self,
        api_url: &str,
        flavor: &str,
        technologies: &str,
        version: &str,
    ) -> Result<String, ImageError> {
        let url = Url::parse(api_url)
            .map_err(|e| ImageError::InvalidApiUrl(format!("{}: {}", api_url, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ImageError::InvalidApiUrl(format!("{}: missing host", api_url)))?;

        let registry = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut repository = format!("{}/{}", registry, CODEMODULES_REPOSITORY);
        if !flavor.is_empty() && flavor != "default" {
            repository.push('-');
            repository.push_str(flavor);
        }

        let mut tag = if version.is_empty() {
            "latest".to_string()
        } else {
            version.to_string()
        };
        if technologies != "all" {
            for tech in technologies.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                tag.push('-');
                tag.push_str(tech);
            }
        }

        Ok(format!("{}:{}", repository, tag))
    }
}

/// Which image the installer init container runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    /// Follow the annotation → resource → built image precedence
    #[default]
    Resolved,
    /// Always run the webhook's own image
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    InstallerUrl,
    Annotation,
    Resource,
    Built,
    WebhookOverride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub image: String,
    pub source: ImageSource,
    /// Set when the code modules come from the private registry
    pub needs_pull_secret: bool,
}

pub fn resolve_image(
    spec: &OneAgentAPMSpec,
    options: &EffectiveOptions,
    webhook_image: &str,
    policy: ImagePolicy,
    builder: &dyn ImageBuilder,
) -> Result<ResolvedImage, ImageError> {
    let explicit = options.image_annotation().or_else(|| spec.explicit_image());
    let needs_pull_secret = !options.has_installer_url() && explicit.is_none();

    let (image, source) = if options.has_installer_url() {
        (webhook_image.to_string(), ImageSource::InstallerUrl)
    } else if policy == ImagePolicy::Webhook {
        (webhook_image.to_string(), ImageSource::WebhookOverride)
    } else if let Some(image) = options.image_annotation() {
        (image.to_string(), ImageSource::Annotation)
    } else if let Some(image) = spec.explicit_image() {
        (image.to_string(), ImageSource::Resource)
    } else {
        let image = builder.build(
            &spec.api_url,
            &options.flavor,
            &options.technologies,
            &spec.agent_version,
        )?;
        (image, ImageSource::Built)
    };

    Ok(ResolvedImage {
        image,
        source,
        needs_pull_secret,
    })
}
