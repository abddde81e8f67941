//! Annotation keys, well-known names and the option resolver
//!
//! Every injection option is looked up first on the pod, then on its
//! namespace, and finally falls back to a built-in default.

use std::collections::BTreeMap;

/// Namespace label naming the `OneAgentAPM` instance the namespace is bound to
pub const LABEL_INSTANCE: &str = "oneagent.dynatrace.com/instance";

/// Opt-in/opt-out flag, `"false"` disables injection
pub const ANNOTATION_INJECT: &str = "oneagent.dynatrace.com/inject";
/// Marker set on pods that already went through injection
pub const ANNOTATION_INJECTED: &str = "oneagent.dynatrace.com/injected";
pub const ANNOTATION_FLAVOR: &str = "oneagent.dynatrace.com/flavor";
pub const ANNOTATION_TECHNOLOGIES: &str = "oneagent.dynatrace.com/technologies";
pub const ANNOTATION_INSTALL_PATH: &str = "oneagent.dynatrace.com/install-path";
pub const ANNOTATION_INSTALLER_URL: &str = "oneagent.dynatrace.com/installer-url";
pub const ANNOTATION_FAILURE_POLICY: &str = "oneagent.dynatrace.com/failure-policy";
pub const ANNOTATION_IMAGE: &str = "oneagent.dynatrace.com/image";

pub const DEFAULT_INJECT: &str = "true";
pub const DEFAULT_FLAVOR: &str = "default";
pub const DEFAULT_TECHNOLOGIES: &str = "all";
pub const DEFAULT_INSTALL_PATH: &str = "/opt/dynatrace/oneagent-paas";
pub const DEFAULT_FAILURE_POLICY: &str = "silent";

/// Secret holding the installer script and runtime configuration (proxy, ...)
pub const SECRET_CONFIG_NAME: &str = "dynatrace-oneagent-config";
/// Pull secret for the private code-modules registry
pub const PULL_SECRET_NAME: &str = "dynatrace-oneagent-pull-secret";

/// Resolve `key` from the pod annotations, then the namespace annotations,
/// then `default`.
pub fn resolve(
    key: &str,
    pod_annotations: Option<&BTreeMap<String, String>>,
    namespace_annotations: Option<&BTreeMap<String, String>>,
    default: &str,
) -> String {
    pod_annotations
        .and_then(|a| a.get(key))
        .or_else(|| namespace_annotations.and_then(|a| a.get(key)))
        .cloned()
        .unwrap_or_else(|| default.to_string())
}
