//! The merged configuration object.
//!
//! These structs mirror the on-disk YAML shape. Structural and semantic
//! validation lives in the topology builder; this module only defines the
//! shape, the defaults, and the templating hooks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use paddock_common::ContainerRef;

use crate::template::EnvTemplate;

/// The root configuration object consumed by the topology builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global settings shared by every container.
    #[serde(default)]
    pub global: GlobalSettings,

    /// Virtual network declarations.
    #[serde(default)]
    pub networks: IpamSettings,

    /// Per-host allow-lists. An absent section allows every container on
    /// every host.
    #[serde(default)]
    pub hosts: Vec<HostEntry>,

    /// Container groups.
    #[serde(default)]
    pub groups: Vec<GroupSettings>,

    /// Container declarations.
    #[serde(default)]
    pub containers: Vec<ContainerSettings>,
}

impl Config {
    /// Parse a configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Fold an overlay configuration into this one.
    ///
    /// List sections are appended; the overlay's base directory and defaults
    /// replace the current ones when set.
    pub fn merge(&mut self, overlay: Self) {
        if !overlay.global.base_dir.is_empty() {
            self.global.base_dir = overlay.global.base_dir;
        }
        if overlay.global.defaults != ContainerDefaults::default() {
            self.global.defaults = overlay.global.defaults;
        }
        self.global.env.extend(overlay.global.env);
        self.global.mounts.extend(overlay.global.mounts);
        self.networks.bridge.extend(overlay.networks.bridge);
        self.networks.container.extend(overlay.networks.container);
        self.hosts.extend(overlay.hosts);
        self.groups.extend(overlay.groups);
        self.containers.extend(overlay.containers);
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Base directory for per-container state (`<base>/<group>/<container>`).
    #[serde(default)]
    pub base_dir: String,

    /// Global env substitutions, in declaration order.
    #[serde(default)]
    pub env: Vec<EnvEntry>,

    /// Mounts applied to every container.
    #[serde(default)]
    pub mounts: Vec<MountSettings>,

    /// Defaults containers inherit unless they override them.
    #[serde(default)]
    pub defaults: ContainerDefaults,
}

/// An ordered env substitution entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    /// The substitution key (referenced as `$$NAME$$`).
    pub name: String,
    /// The substituted value.
    pub value: String,
}

/// Container defaults inherited from the global section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefaults {
    /// Seconds a graceful stop may take before the runtime escalates.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u32,

    /// Restart policy passed to the runtime.
    #[serde(default)]
    pub restart_policy: Option<String>,

    /// Delay between purge attempts, in milliseconds.
    #[serde(default = "default_purge_delay")]
    pub purge_delay_ms: u64,

    /// Default image pull policy.
    #[serde(default)]
    pub pull: PullPolicy,

    /// Default platform qualifier for image operations.
    #[serde(default)]
    pub platform: Option<String>,
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout(),
            restart_policy: None,
            purge_delay_ms: default_purge_delay(),
            pull: PullPolicy::default(),
            platform: None,
        }
    }
}

fn default_stop_timeout() -> u32 {
    10
}

fn default_purge_delay() -> u64 {
    1000
}

/// Image pull policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull on every start.
    Always,
    /// Pull only when the image is missing locally.
    #[default]
    IfMissing,
    /// Never pull.
    Never,
}

/// Virtual network declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpamSettings {
    /// Bridge-mode networks.
    #[serde(default)]
    pub bridge: Vec<BridgeNetworkSettings>,

    /// Container-mode (shared network stack) declarations.
    #[serde(default)]
    pub container: Vec<ContainerNetworkSettings>,
}

/// A bridge-mode network declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeNetworkSettings {
    /// Network name, unique across both modes.
    pub name: String,
    /// Host bridge interface name, globally unique.
    pub host_interface: String,
    /// IPv4 CIDR of the network (must be the network address).
    pub cidr: String,
    /// Priority; lower values are more primary.
    pub priority: u32,
    /// Containers attached to this network.
    #[serde(default)]
    pub containers: Vec<EndpointSettings>,
}

/// One container endpoint inside a bridge network declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Group of the attached container.
    pub group: String,
    /// Name of the attached container.
    pub container: String,
    /// Static IPv4 address inside the network CIDR.
    #[serde(default)]
    pub ip: Option<String>,
}

impl EndpointSettings {
    /// The reference of the attached container.
    #[must_use]
    pub fn reference(&self) -> ContainerRef {
        ContainerRef::new(&self.group, &self.container)
    }
}

/// A container-mode network declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerNetworkSettings {
    /// Network name, unique across both modes.
    pub name: String,
    /// The container whose network namespace is shared.
    pub target: ContainerRef,
    /// Containers that join the target's network stack.
    #[serde(default)]
    pub attached: Vec<ContainerRef>,
}

/// A host allow-list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// The host name this entry applies to.
    pub name: String,
    /// Containers allowed to run on this host.
    #[serde(default)]
    pub allow: Vec<ContainerRef>,
}

/// A container group declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Group name, unique and non-empty.
    pub name: String,
    /// Cross-group sequencing order; positive, lower starts first.
    pub order: u32,
}

/// A container declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// The group this container belongs to.
    pub group: String,
    /// Container name within the group.
    pub name: String,
    /// Lifecycle order inside the group; positive, lower starts first.
    pub order: u32,

    /// Image settings.
    pub image: ImageSettings,

    /// Environment substitutions scoped to this container, in order.
    #[serde(default)]
    pub env: Vec<EnvEntry>,

    /// Labels attached to the created container.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// User the container process runs as.
    #[serde(default)]
    pub user: Option<String>,

    /// External command executed before Start begins (non-zero exit fails
    /// the start).
    #[serde(default)]
    pub start_pre_hook: Vec<String>,

    /// Per-container graceful stop timeout.
    #[serde(default)]
    pub stop_timeout_secs: Option<u32>,

    /// Per-container restart policy.
    #[serde(default)]
    pub restart_policy: Option<String>,

    /// Bind mounts, in addition to the global ones.
    #[serde(default)]
    pub mounts: Vec<MountSettings>,

    /// Host devices mapped into the container.
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,

    /// Published ports.
    #[serde(default)]
    pub ports: Vec<PortSettings>,

    /// Sysctls set inside the container.
    #[serde(default)]
    pub sysctls: BTreeMap<String, String>,

    /// Shared-memory size ("512m", "1Gi", plain bytes).
    #[serde(default)]
    pub shm_size: Option<String>,

    /// Health check.
    #[serde(default)]
    pub health: Option<HealthSettings>,
}

impl ContainerSettings {
    /// The reference of this container.
    #[must_use]
    pub fn reference(&self) -> ContainerRef {
        ContainerRef::new(&self.group, &self.name)
    }

    /// Resolve every templated string field through `tpl`.
    ///
    /// Runs before validation so that template values participate in all
    /// structural checks.
    #[must_use]
    pub fn templated(&self, tpl: &EnvTemplate) -> Self {
        let mut resolved = self.clone();
        resolved.image.reference = tpl.apply(&self.image.reference);
        resolved.user = self.user.as_deref().map(|u| tpl.apply(u));
        resolved.start_pre_hook = self.start_pre_hook.iter().map(|a| tpl.apply(a)).collect();
        resolved.labels = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), tpl.apply(v)))
            .collect();
        resolved.env = self
            .env
            .iter()
            .map(|e| EnvEntry {
                name: e.name.clone(),
                value: tpl.apply(&e.value),
            })
            .collect();
        resolved.mounts = self.mounts.iter().map(|m| m.templated(tpl)).collect();
        resolved.sysctls = self
            .sysctls
            .iter()
            .map(|(k, v)| (k.clone(), tpl.apply(v)))
            .collect();
        if let Some(health) = &mut resolved.health {
            let test = health.test.iter().map(|a| tpl.apply(a)).collect();
            health.test = test;
        }
        resolved
    }
}

/// A bind mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSettings {
    /// Source path on the host.
    pub source: String,
    /// Target path inside the container.
    pub target: String,
    /// Mount read-only.
    #[serde(default)]
    pub read_only: bool,
}

impl MountSettings {
    /// Resolve the templated paths through `tpl`.
    #[must_use]
    pub fn templated(&self, tpl: &EnvTemplate) -> Self {
        Self {
            source: tpl.apply(&self.source),
            target: tpl.apply(&self.target),
            read_only: self.read_only,
        }
    }
}

/// A host device mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Device path on the host.
    pub host: String,
    /// Device path inside the container; defaults to the host path.
    #[serde(default)]
    pub container: Option<String>,
    /// Cgroup permissions.
    #[serde(default = "default_device_permissions")]
    pub permissions: String,
}

fn default_device_permissions() -> String {
    "rwm".to_string()
}

/// A published port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    /// Host address to bind; defaults to all addresses.
    #[serde(default)]
    pub host_ip: Option<String>,
    /// Host port.
    pub host: u16,
    /// Container port.
    pub container: u16,
    /// Protocol, `tcp` or `udp`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Container health check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Command executed inside the container.
    pub test: Vec<String>,
    /// Seconds between checks.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u32,
    /// Seconds a single check may run.
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u32,
    /// Consecutive failures before the container counts as unhealthy.
    #[serde(default = "default_health_retries")]
    pub retries: u32,
    /// Grace period after start, in seconds.
    #[serde(default)]
    pub start_period_secs: u32,
}

fn default_health_interval() -> u32 {
    30
}

fn default_health_timeout() -> u32 {
    10
}

fn default_health_retries() -> u32 {
    3
}

/// Image settings of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    /// The image reference, e.g. `nginx:1.27`.
    pub reference: String,
    /// Platform qualifier, e.g. `linux/arm64`.
    #[serde(default)]
    pub platform: Option<String>,
    /// Pull policy; falls back to the global default.
    #[serde(default)]
    pub pull: Option<PullPolicy>,
    /// Log pull failures instead of failing the start.
    #[serde(default)]
    pub ignore_pull_failure: bool,
    /// Pull a fresh image before a Stop (upgrade-on-restart flows).
    #[serde(default)]
    pub refresh_before_stop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
global:
  base_dir: /srv/paddock
  env:
    - name: TZ
      value: Europe/Paris

networks:
  bridge:
    - name: lan
      host_interface: pd-lan
      cidr: 172.20.0.0/24
      priority: 1
      containers:
        - group: infra
          container: proxy
          ip: 172.20.0.10

groups:
  - name: infra
    order: 1

containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
    ports:
      - host: 80
        container: 80
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.global.base_dir, "/srv/paddock");
        assert_eq!(config.networks.bridge.len(), 1);
        assert_eq!(config.containers.len(), 1);
        assert_eq!(config.containers[0].ports[0].protocol, "tcp");
        assert_eq!(config.global.defaults.stop_timeout_secs, 10);
    }

    #[test]
    fn merge_appends_sections_and_replaces_base_dir() {
        let mut base = Config::from_yaml("global:\n  base_dir: /srv/a\n").unwrap();
        let overlay = Config::from_yaml(
            "global:\n  base_dir: /srv/b\ngroups:\n  - name: infra\n    order: 1\n",
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.global.base_dir, "/srv/b");
        assert_eq!(base.groups.len(), 1);
    }

    #[test]
    fn pull_policy_defaults_to_if_missing() {
        assert_eq!(PullPolicy::default(), PullPolicy::IfMissing);
    }
}
