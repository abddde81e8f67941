//! `OneAgentAPM` custom resource
//!
//! Describes how the code modules are delivered to the namespaces bound to
//! it. The webhook only reads it; the operator's reconciler owns it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Proxy settings for agents talking to the cluster endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OneAgentProxy {
    /// Inline proxy URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Name of a secret holding the proxy URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_from: String,
}

impl OneAgentProxy {
    /// True if either the inline value or the secret reference is set
    pub fn is_configured(&self) -> bool {
        !self.value.is_empty() || !self.value_from.is_empty()
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "dynatrace.com",
    version = "v1alpha1",
    kind = "OneAgentAPM",
    plural = "oneagentapms",
    namespaced,
    printcolumn = r#"{"name":"ApiUrl","type":"string","jsonPath":".spec.apiUrl"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OneAgentAPMSpec {
    /// Environment API endpoint, e.g. `https://abc123.live.dynatrace.com/api`
    pub api_url: String,

    /// Code modules version; latest when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_version: String,

    /// Explicit code modules image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<OneAgentProxy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_zone: Option<String>,

    /// Disable certificate validation towards the API
    #[serde(default)]
    pub skip_cert_check: bool,

    /// Name of a config map holding custom CA certificates
    #[serde(default, rename = "trustedCAs", skip_serializing_if = "Option::is_none")]
    pub trusted_cas: Option<String>,

    /// Name of the secret holding the API and PaaS tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<String>,
}

impl OneAgentAPMSpec {
    /// Explicit image, treating an empty string as unset
    pub fn explicit_image(&self) -> Option<&str> {
        self.image.as_deref().filter(|i| !i.is_empty())
    }

    pub fn network_zone(&self) -> Option<&str> {
        self.network_zone.as_deref().filter(|z| !z.is_empty())
    }

    pub fn has_proxy(&self) -> bool {
        self.proxy.as_ref().is_some_and(OneAgentProxy::is_configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: OneAgentAPMSpec = serde_json::from_value(json!({
            "apiUrl": "https://abc123.live.dynatrace.com/api",
            "agentVersion": "1.191",
            "proxy": {"valueFrom": "proxy-secret"},
            "networkZone": "zone-a",
            "trustedCAs": "custom-cas"
        }))
        .unwrap();

        assert_eq!(spec.api_url, "https://abc123.live.dynatrace.com/api");
        assert_eq!(spec.agent_version, "1.191");
        assert!(spec.has_proxy());
        assert_eq!(spec.network_zone(), Some("zone-a"));
        assert_eq!(spec.trusted_cas.as_deref(), Some("custom-cas"));
        assert_eq!(spec.explicit_image(), None);
        assert!(!spec.skip_cert_check);
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let spec = OneAgentAPMSpec {
            image: Some(String::new()),
            network_zone: Some(String::new()),
            proxy: Some(OneAgentProxy::default()),
            ..Default::default()
        };

        assert_eq!(spec.explicit_image(), None);
        assert_eq!(spec.network_zone(), None);
        assert!(!spec.has_proxy());
    }
}
