//! Test fixtures shared by the unit tests

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Namespace, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use serde_json::{json, Value};

use crate::annotations::LABEL_INSTANCE;
use crate::crd::{OneAgentAPM, OneAgentAPMSpec};
use crate::store::{ObjectStore, StoreError};

/// In-memory object store
#[derive(Default)]
pub struct MemoryStore {
    namespaces: HashMap<String, Namespace>,
    configs: HashMap<(String, String), OneAgentAPM>,
    pods: HashMap<(String, String), Pod>,
}

impl MemoryStore {
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        self.namespaces.insert(name, namespace);
        self
    }

    pub fn with_config(mut self, namespace: &str, config: OneAgentAPM) -> Self {
        let name = config.metadata.name.clone().unwrap_or_default();
        self.configs.insert((namespace.to_string(), name), config);
        self
    }

    pub fn with_pod(mut self, namespace: &str, pod: Pod) -> Self {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.insert((namespace.to_string(), name), pod);
        self
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn namespace(&self, name: &str) -> Result<Namespace, StoreError> {
        self.namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "Namespace",
                name: name.to_string(),
            })
    }

    async fn config(&self, name: &str, namespace: &str) -> Result<OneAgentAPM, StoreError> {
        self.configs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "OneAgentAPM",
                name: name.to_string(),
            })
    }

    async fn pod(&self, name: &str, namespace: &str) -> Result<Pod, StoreError> {
        self.pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "Pod",
                name: name.to_string(),
            })
    }
}

fn string_map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

pub fn namespace(name: &str, instance: Option<&str>, annotations: &[(&str, &str)]) -> Namespace {
    let labels = instance.map(|i| BTreeMap::from([(LABEL_INSTANCE.to_string(), i.to_string())]));
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels,
            annotations: string_map(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// `OneAgentAPM` pointing at a SaaS environment, adjusted by `configure`
pub fn oneagent(name: &str, configure: impl FnOnce(&mut OneAgentAPMSpec)) -> OneAgentAPM {
    let mut spec = OneAgentAPMSpec {
        api_url: "https://abc123.live.dynatrace.com/api".to_string(),
        ..Default::default()
    };
    configure(&mut spec);
    OneAgentAPM::new(name, spec)
}

pub fn container(name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some("nginx:1.25".to_string()),
        ..Default::default()
    }
}

pub fn pod(containers: Vec<Container>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            generate_name: Some("web-".to_string()),
            namespace: Some("apps".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod_with_annotations(annotations: &[(&str, &str)]) -> Pod {
    let mut pod = pod(vec![container("app")]);
    pod.metadata.annotations = string_map(annotations);
    pod
}

/// Wrap a pod document into a CREATE admission request for namespace `apps`
pub fn admission_request(object: Value) -> AdmissionRequest<DynamicObject> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "name": "",
            "namespace": "apps",
            "operation": "CREATE",
            "userInfo": {},
            "object": object
        }
    }))
    .unwrap();
    review.try_into().unwrap()
}
