//! The resolved container: templated settings, network membership and the
//! cached creation request.

use paddock_common::{ContainerRef, MemoryQuantity, PaddockError, PaddockResult};
use paddock_config::{ContainerDefaults, ContainerSettings, MountSettings, PullPolicy};
use paddock_net::{Endpoint, SharedStack};
use paddock_runtime::{
    CreateSpec, DeviceSpec, HealthSpec, NetworkAttachment, PortSpec,
};

/// A fully resolved container.
///
/// All template substitutions have been applied and all inherited defaults
/// folded in; the lifecycle engine reads this struct without consulting the
/// configuration again.
#[derive(Debug, Clone)]
pub struct Container {
    /// The global identity of this container.
    pub reference: ContainerRef,
    /// Templated declaration.
    pub settings: ContainerSettings,
    /// Order of the owning group, copied for sequencing.
    pub group_order: u32,
    /// Bridge endpoints, sorted ascending by priority; index 0 is primary.
    pub endpoints: Vec<Endpoint>,
    /// Shared-stack membership, mutually exclusive with `endpoints`.
    pub shared_stack: Option<SharedStack>,
    /// Whether the executing host's allow-list admits this container.
    pub allowed_on_host: bool,
    /// Effective graceful stop timeout.
    pub stop_timeout_secs: u32,
    /// Effective delay between purge attempts, in milliseconds.
    pub purge_delay_ms: u64,
    /// Effective pull policy.
    pub pull: PullPolicy,
    /// Effective platform qualifier for image operations.
    pub platform: Option<String>,
    /// The cached creation request.
    pub create_spec: CreateSpec,
}

impl Container {
    /// The name this container carries in the runtime.
    #[must_use]
    pub fn runtime_name(&self) -> String {
        self.reference.runtime_name()
    }

    /// The primary bridge endpoint, when the container has one.
    #[must_use]
    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }

    /// Secondary bridge endpoints, connected after creation.
    #[must_use]
    pub fn secondary_endpoints(&self) -> &[Endpoint] {
        if self.endpoints.is_empty() {
            &[]
        } else {
            &self.endpoints[1..]
        }
    }
}

fn bind(mount: &MountSettings) -> String {
    let mode = if mount.read_only { "ro" } else { "rw" };
    format!("{}:{}:{}", mount.source, mount.target, mode)
}

/// Assemble the creation request for a validated container.
///
/// Global mounts come before container mounts, matching their precedence in
/// the runtime. The network attachment is the shared stack when one exists,
/// otherwise the primary bridge endpoint.
pub(crate) fn build_create_spec(
    reference: &ContainerRef,
    settings: &ContainerSettings,
    defaults: &ContainerDefaults,
    global_mounts: &[MountSettings],
    endpoints: &[Endpoint],
    shared_stack: Option<&SharedStack>,
) -> PaddockResult<CreateSpec> {
    let shm_size_bytes = match &settings.shm_size {
        Some(raw) => {
            let quantity: MemoryQuantity = raw.parse().map_err(|err| {
                PaddockError::config(format!(
                    "container \"{reference}\": invalid shm_size: {err}"
                ))
            })?;
            let bytes = i64::try_from(quantity.as_bytes()).map_err(|_| {
                PaddockError::config(format!(
                    "container \"{reference}\": shm_size exceeds the runtime limit"
                ))
            })?;
            Some(bytes)
        }
        None => None,
    };

    let network = if let Some(stack) = shared_stack {
        NetworkAttachment::SharedStack {
            container: stack.target.runtime_name(),
        }
    } else if let Some(primary) = endpoints.first() {
        NetworkAttachment::Bridge {
            network: primary.network.clone(),
            ip: primary.ip,
        }
    } else {
        NetworkAttachment::None
    };

    Ok(CreateSpec {
        name: reference.runtime_name(),
        image: settings.image.reference.clone(),
        env: settings
            .env
            .iter()
            .map(|e| format!("{}={}", e.name, e.value))
            .collect(),
        labels: settings.labels.clone(),
        user: settings.user.clone(),
        binds: global_mounts
            .iter()
            .chain(settings.mounts.iter())
            .map(bind)
            .collect(),
        devices: settings
            .devices
            .iter()
            .map(|d| DeviceSpec {
                host_path: d.host.clone(),
                container_path: d.container.clone().unwrap_or_else(|| d.host.clone()),
                permissions: d.permissions.clone(),
            })
            .collect(),
        ports: settings
            .ports
            .iter()
            .map(|p| PortSpec {
                host_ip: p.host_ip.clone(),
                host_port: p.host,
                container_port: p.container,
                protocol: p.protocol.clone(),
            })
            .collect(),
        sysctls: settings.sysctls.clone(),
        shm_size_bytes,
        restart_policy: settings
            .restart_policy
            .clone()
            .or_else(|| defaults.restart_policy.clone()),
        health: settings.health.as_ref().map(|h| HealthSpec {
            test: h.test.clone(),
            interval_secs: h.interval_secs,
            timeout_secs: h.timeout_secs,
            retries: h.retries,
            start_period_secs: h.start_period_secs,
        }),
        network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use paddock_config::{EnvEntry, ImageSettings};

    fn settings() -> ContainerSettings {
        ContainerSettings {
            group: "infra".to_string(),
            name: "proxy".to_string(),
            order: 1,
            image: ImageSettings {
                reference: "nginx:1.27".to_string(),
                platform: None,
                pull: None,
                ignore_pull_failure: false,
                refresh_before_stop: false,
            },
            env: vec![EnvEntry {
                name: "TZ".to_string(),
                value: "UTC".to_string(),
            }],
            labels: std::collections::BTreeMap::new(),
            user: None,
            start_pre_hook: Vec::new(),
            stop_timeout_secs: None,
            restart_policy: None,
            mounts: vec![MountSettings {
                source: "/srv/proxy".to_string(),
                target: "/data".to_string(),
                read_only: true,
            }],
            devices: Vec::new(),
            ports: Vec::new(),
            sysctls: std::collections::BTreeMap::new(),
            shm_size: Some("64Mi".to_string()),
            health: None,
        }
    }

    #[test]
    fn spec_carries_env_binds_and_shm_size() {
        let reference = ContainerRef::new("infra", "proxy");
        let global_mounts = vec![MountSettings {
            source: "/etc/localtime".to_string(),
            target: "/etc/localtime".to_string(),
            read_only: true,
        }];

        let spec = build_create_spec(
            &reference,
            &settings(),
            &ContainerDefaults::default(),
            &global_mounts,
            &[],
            None,
        )
        .unwrap();
        assert_eq!(spec.name, "infra-proxy");
        assert_eq!(spec.env, vec!["TZ=UTC".to_string()]);
        assert_eq!(
            spec.binds,
            vec![
                "/etc/localtime:/etc/localtime:ro".to_string(),
                "/srv/proxy:/data:ro".to_string(),
            ]
        );
        assert_eq!(spec.shm_size_bytes, Some(64 * 1024 * 1024));
        assert_eq!(spec.network, NetworkAttachment::None);
    }

    #[test]
    fn shared_stack_wins_over_endpoints() {
        let reference = ContainerRef::new("infra", "sidecar");
        let stack = SharedStack {
            network: "vpnstack".to_string(),
            target: ContainerRef::new("infra", "vpn"),
        };
        let endpoints = vec![Endpoint {
            network: "lan".to_string(),
            priority: 1,
            ip: None,
        }];

        // Validation rejects this combination; the builder still has a
        // deterministic answer.
        let spec = build_create_spec(
            &reference,
            &settings(),
            &ContainerDefaults::default(),
            &[],
            &endpoints,
            Some(&stack),
        )
        .unwrap();
        assert_eq!(
            spec.network,
            NetworkAttachment::SharedStack {
                container: "infra-vpn".to_string()
            }
        );
    }

    #[test]
    fn primary_endpoint_becomes_bridge_attachment() {
        let reference = ContainerRef::new("infra", "proxy");
        let endpoints = vec![
            Endpoint {
                network: "lan".to_string(),
                priority: 1,
                ip: Some("172.20.0.10".parse().unwrap()),
            },
            Endpoint {
                network: "dmz".to_string(),
                priority: 2,
                ip: None,
            },
        ];

        let spec = build_create_spec(
            &reference,
            &settings(),
            &ContainerDefaults::default(),
            &[],
            &endpoints,
            None,
        )
        .unwrap();
        assert_eq!(
            spec.network,
            NetworkAttachment::Bridge {
                network: "lan".to_string(),
                ip: Some("172.20.0.10".parse().unwrap()),
            }
        );
    }
}
