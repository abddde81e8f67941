//! Per-request injection options

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::annotations::{
    resolve, ANNOTATION_FAILURE_POLICY, ANNOTATION_FLAVOR, ANNOTATION_IMAGE,
    ANNOTATION_INSTALLER_URL, ANNOTATION_INSTALL_PATH, ANNOTATION_TECHNOLOGIES,
    DEFAULT_FAILURE_POLICY, DEFAULT_FLAVOR, DEFAULT_INSTALL_PATH, DEFAULT_TECHNOLOGIES,
};

/// Options resolved for a single pod, pod annotation first, then namespace
/// annotation, then the built-in default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveOptions {
    /// Code modules flavor, e.g. `default` or `musl`
    pub flavor: String,
    /// Comma separated technologies, `all` for every technology
    pub technologies: String,
    pub install_path: String,
    /// Installer download URL; empty when the image provides the installer
    pub installer_url: String,
    pub failure_policy: String,
    /// Image override from the annotation; empty when unset
    pub image: String,
}

impl EffectiveOptions {
    pub fn resolve(
        pod_annotations: Option<&BTreeMap<String, String>>,
        namespace_annotations: Option<&BTreeMap<String, String>>,
    ) -> Self {
        let get = |key: &str, default: &str| {
            resolve(key, pod_annotations, namespace_annotations, default)
        };

        Self {
            flavor: get(ANNOTATION_FLAVOR, DEFAULT_FLAVOR),
            technologies: get(ANNOTATION_TECHNOLOGIES, DEFAULT_TECHNOLOGIES),
            install_path: get(ANNOTATION_INSTALL_PATH, DEFAULT_INSTALL_PATH),
            installer_url: get(ANNOTATION_INSTALLER_URL, ""),
            failure_policy: get(ANNOTATION_FAILURE_POLICY, DEFAULT_FAILURE_POLICY),
            image: get(ANNOTATION_IMAGE, ""),
        }
    }

    /// Flavor as handed to the installer, query-escaped
    pub fn flavor_query(&self) -> String {
        query_escape(&self.flavor)
    }

    /// Technologies as handed to the installer, query-escaped
    pub fn technologies_query(&self) -> String {
        query_escape(&self.technologies)
    }

    pub fn has_installer_url(&self) -> bool {
        !self.installer_url.is_empty()
    }

    pub fn image_annotation(&self) -> Option<&str> {
        Some(self.image.as_str()).filter(|i| !i.is_empty())
    }

    /// Path of the agent library loaded through `LD_PRELOAD`
    pub fn preload_library(&self) -> String {
        format!("{}/agent/lib64/liboneagentproc.so", self.install_path)
    }
}

fn query_escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
