//! Pod mutation
//!
//! Works on a clone of the admitted pod. The original is left untouched so
//! the patch can be computed against it.

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, LocalObjectReference, Pod,
    SecretKeySelector, SecretVolumeSource, SecurityContext, Volume, VolumeMount,
};

use crate::annotations::{ANNOTATION_INJECTED, PULL_SECRET_NAME, SECRET_CONFIG_NAME};
use crate::crd::OneAgentAPMSpec;
use crate::error::InjectError;
use crate::image::ResolvedImage;
use crate::options::EffectiveOptions;

pub const AGENT_VOLUME: &str = "oneagent";
pub const CONFIG_VOLUME: &str = "oneagent-config";
pub const INSTALL_CONTAINER: &str = "install-oneagent";

const AGENT_MOUNT_PATH: &str = "/mnt/oneagent";
const CONFIG_MOUNT_PATH: &str = "/mnt/config";
const PRELOAD_PATH: &str = "/etc/ld.so.preload";
const PRELOAD_SUB_PATH: &str = "ld.so.preload";
const PROXY_SECRET_KEY: &str = "proxy";

/// Return an injected copy of `pod`.
pub fn mutate(
    pod: &Pod,
    options: &EffectiveOptions,
    image: &ResolvedImage,
    config: &OneAgentAPMSpec,
) -> Result<Pod, InjectError> {
    let mut pod = pod.clone();

    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(ANNOTATION_INJECTED.to_string(), "true".to_string());

    let spec = pod
        .spec
        .as_mut()
        .ok_or_else(|| InjectError::Mutation("pod has no spec".to_string()))?;

    spec.volumes.get_or_insert_with(Vec::new).extend([
        Volume {
            name: AGENT_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: CONFIG_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(SECRET_CONFIG_NAME.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]);

    if image.needs_pull_secret {
        spec.image_pull_secrets
            .get_or_insert_with(Vec::new)
            .push(LocalObjectReference {
                name: Some(PULL_SECRET_NAME.to_string()),
            });
    }

    // Cloned, never shared with the application container
    let security_context = spec
        .containers
        .first()
        .and_then(|c| c.security_context.clone());

    spec.init_containers
        .get_or_insert_with(Vec::new)
        .push(install_container(options, &image.image, security_context));

    let install_path = options.install_path.as_str();
    for container in spec.containers.iter_mut() {
        container.volume_mounts.get_or_insert_with(Vec::new).extend([
            VolumeMount {
                name: AGENT_VOLUME.to_string(),
                mount_path: PRELOAD_PATH.to_string(),
                sub_path: Some(PRELOAD_SUB_PATH.to_string()),
                ..Default::default()
            },
            VolumeMount {
                name: AGENT_VOLUME.to_string(),
                mount_path: install_path.to_string(),
                ..Default::default()
            },
        ]);

        let env = container.env.get_or_insert_with(Vec::new);
        env.push(plain_env("LD_PRELOAD", options.preload_library()));

        if config.has_proxy() {
            env.push(EnvVar {
                name: "DT_PROXY".to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: Some(SECRET_CONFIG_NAME.to_string()),
                        key: PROXY_SECRET_KEY.to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        if let Some(zone) = config.network_zone() {
            env.push(plain_env("DT_NETWORK_ZONE", zone));
        }
    }

    Ok(pod)
}

fn install_container(
    options: &EffectiveOptions,
    image: &str,
    security_context: Option<SecurityContext>,
) -> Container {
    Container {
        name: INSTALL_CONTAINER.to_string(),
        image: Some(image.to_string()),
        command: Some(vec!["/usr/bin/env".to_string()]),
        args: Some(vec!["bash".to_string(), format!("{}/init.sh", CONFIG_MOUNT_PATH)]),
        env: Some(vec![
            plain_env("FLAVOR", options.flavor_query()),
            plain_env("TECHNOLOGIES", options.technologies_query()),
            plain_env("INSTALLPATH", &options.install_path),
            plain_env("INSTALLER_URL", &options.installer_url),
            plain_env("FAILURE_POLICY", &options.failure_policy),
        ]),
        security_context,
        volume_mounts: Some(vec![
            VolumeMount {
                name: AGENT_VOLUME.to_string(),
                mount_path: AGENT_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::OneAgentProxy;
    use crate::image::ImageSource;
    use crate::testing::{container, pod};

    fn resolved(image: &str, needs_pull_secret: bool) -> ResolvedImage {
        ResolvedImage {
            image: image.to_string(),
            source: ImageSource::Resource,
            needs_pull_secret,
        }
    }

    fn env_value<'a>(c: &'a Container, name: &str) -> Option<&'a EnvVar> {
        c.env.as_ref()?.iter().find(|e| e.name == name)
    }

    #[test]
    fn test_every_container_gets_mounts_and_preload() {
        let original = pod(vec![container("app"), container("sidecar"), container("log")]);
        let options = EffectiveOptions::resolve(None, None);

        let mutated = mutate(
            &original,
            &options,
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();

        let spec = mutated.spec.as_ref().unwrap();
        assert_eq!(spec.containers.len(), 3);
        assert_eq!(spec.init_containers.as_ref().unwrap().len(), 1);

        for c in &spec.containers {
            let mounts = c.volume_mounts.as_ref().unwrap();
            assert_eq!(mounts.len(), 2);
            assert_eq!(mounts[0].mount_path, "/etc/ld.so.preload");
            assert_eq!(mounts[0].sub_path.as_deref(), Some("ld.so.preload"));
            assert_eq!(mounts[1].mount_path, "/opt/dynatrace/oneagent-paas");

            let env = c.env.as_ref().unwrap();
            assert_eq!(env.len(), 1);
            assert_eq!(
                env[0].value.as_deref(),
                Some("/opt/dynatrace/oneagent-paas/agent/lib64/liboneagentproc.so")
            );
        }
    }

    #[test]
    fn test_original_pod_is_untouched() {
        let original = pod(vec![container("app")]);
        let before = original.clone();

        let _ = mutate(
            &original,
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", true),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();

        assert_eq!(original, before);
    }

    #[test]
    fn test_marks_pod_injected() {
        let mutated = mutate(
            &pod(vec![container("app")]),
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();

        let annotations = mutated.metadata.annotations.unwrap();
        assert_eq!(annotations.get(ANNOTATION_INJECTED).map(String::as_str), Some("true"));
    }

    #[test]
    fn test_volumes_and_install_container() {
        let mut options = EffectiveOptions::resolve(None, None);
        options.technologies = "java,nodejs".to_string();
        options.installer_url = "https://example.com/installer".to_string();

        let mutated = mutate(
            &pod(vec![container("app")]),
            &options,
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();
        let spec = mutated.spec.unwrap();

        let volumes = spec.volumes.unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].name, AGENT_VOLUME);
        assert!(volumes[0].empty_dir.is_some());
        assert_eq!(
            volumes[1].secret.as_ref().unwrap().secret_name.as_deref(),
            Some(SECRET_CONFIG_NAME)
        );

        let init = &spec.init_containers.unwrap()[0];
        assert_eq!(init.name, INSTALL_CONTAINER);
        assert_eq!(init.image.as_deref(), Some("registry/agent:1.0"));
        assert_eq!(init.args.as_ref().unwrap(), &["bash", "/mnt/config/init.sh"]);
        assert_eq!(
            env_value(init, "TECHNOLOGIES").unwrap().value.as_deref(),
            Some("java%2Cnodejs")
        );
        assert_eq!(
            env_value(init, "INSTALLER_URL").unwrap().value.as_deref(),
            Some("https://example.com/installer")
        );
        assert_eq!(init.volume_mounts.as_ref().unwrap().len(), 2);
        assert!(spec.image_pull_secrets.is_none());
    }

    #[test]
    fn test_pull_secret_appended_when_needed() {
        let mutated = mutate(
            &pod(vec![container("app")]),
            &EffectiveOptions::resolve(None, None),
            &resolved("built/codemodules:latest", true),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();

        let secrets = mutated.spec.unwrap().image_pull_secrets.unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].name.as_deref(), Some(PULL_SECRET_NAME));
    }

    #[test]
    fn test_security_context_copied_from_first_container() {
        let mut app = container("app");
        app.security_context = Some(SecurityContext {
            run_as_user: Some(1000),
            ..Default::default()
        });
        let original = pod(vec![app, container("sidecar")]);

        let mutated = mutate(
            &original,
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();
        let spec = mutated.spec.unwrap();

        let init = &spec.init_containers.unwrap()[0];
        assert_eq!(
            init.security_context.as_ref().unwrap().run_as_user,
            Some(1000)
        );
        assert_eq!(
            spec.containers[0].security_context,
            original.spec.as_ref().unwrap().containers[0].security_context
        );
    }

    #[test]
    fn test_proxy_and_network_zone() {
        let config = OneAgentAPMSpec {
            proxy: Some(OneAgentProxy {
                value: "http://proxy:3128".to_string(),
                ..Default::default()
            }),
            network_zone: Some("zone-a".to_string()),
            ..Default::default()
        };

        let mutated = mutate(
            &pod(vec![container("app"), container("sidecar")]),
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &config,
        )
        .unwrap();

        for c in &mutated.spec.unwrap().containers {
            assert_eq!(c.env.as_ref().unwrap().len(), 3);

            let proxy = env_value(c, "DT_PROXY").unwrap();
            // Never inlined, even with an inline value on the resource
            assert!(proxy.value.is_none());
            let secret_ref = proxy
                .value_from
                .as_ref()
                .and_then(|v| v.secret_key_ref.as_ref())
                .unwrap();
            assert_eq!(secret_ref.name.as_deref(), Some(SECRET_CONFIG_NAME));
            assert_eq!(secret_ref.key, "proxy");

            assert_eq!(
                env_value(c, "DT_NETWORK_ZONE").unwrap().value.as_deref(),
                Some("zone-a")
            );
        }
    }

    #[test]
    fn test_proxy_without_network_zone() {
        let config = OneAgentAPMSpec {
            proxy: Some(OneAgentProxy {
                value_from: "oneagent-proxy-secret".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mutated = mutate(
            &pod(vec![container("app"), container("sidecar")]),
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &config,
        )
        .unwrap();

        let containers = mutated.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        for c in &containers {
            let names: Vec<_> = c.env.as_ref().unwrap().iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, ["LD_PRELOAD", "DT_PROXY"]);
            assert!(env_value(c, "DT_NETWORK_ZONE").is_none());
            assert_eq!(c.volume_mounts.as_ref().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_existing_entries_are_preserved() {
        let mut app = container("app");
        app.env = Some(vec![plain_env("EXISTING", "1")]);
        app.volume_mounts = Some(vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
            ..Default::default()
        }]);

        let mutated = mutate(
            &pod(vec![app]),
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();
        let c = &mutated.spec.unwrap().containers[0];

        assert_eq!(c.env.as_ref().unwrap()[0].name, "EXISTING");
        assert_eq!(c.env.as_ref().unwrap().len(), 2);
        assert_eq!(c.volume_mounts.as_ref().unwrap()[0].name, "data");
        assert_eq!(c.volume_mounts.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_pod_without_containers() {
        let mutated = mutate(
            &pod(vec![]),
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap();
        let spec = mutated.spec.unwrap();

        assert!(spec.containers.is_empty());
        assert!(spec.init_containers.unwrap()[0].security_context.is_none());
    }

    #[test]
    fn test_pod_without_spec_is_mutation_error() {
        let err = mutate(
            &Pod::default(),
            &EffectiveOptions::resolve(None, None),
            &resolved("registry/agent:1.0", false),
            &OneAgentAPMSpec::default(),
        )
        .unwrap_err();

        assert!(matches!(err, InjectError::Mutation(_)));
    }
}
