//! The runtime-client contract.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;

use paddock_common::PaddockResult;

/// Observed runtime state of a container.
///
/// This is a closed set: every lifecycle operation matches it exhaustively,
/// and [`ContainerStatus::Unknown`] is treated as an unrecoverable internal
/// defect rather than a retryable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// No container of that name exists.
    NotFound,
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed by an external agent.
    Removing,
    /// Exited.
    Exited,
    /// Dead (failed removal).
    Dead,
    /// A state value this engine does not recognise.
    Unknown,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not-found",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// How the container attaches to the network at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkAttachment {
    /// No paddock-managed network.
    #[default]
    None,
    /// Attach the primary bridge network natively at create time.
    Bridge {
        /// The network name.
        network: String,
        /// Static address inside the network, when assigned.
        ip: Option<Ipv4Addr>,
    },
    /// Join another container's network namespace.
    SharedStack {
        /// Runtime name of the container whose stack is shared.
        container: String,
    },
}

/// A host device mapped into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Device path on the host.
    pub host_path: String,
    /// Device path inside the container.
    pub container_path: String,
    /// Cgroup permissions, e.g. `rwm`.
    pub permissions: String,
}

/// A published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Host address to bind, or all addresses.
    pub host_ip: Option<String>,
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
    /// Protocol, `tcp` or `udp`.
    pub protocol: String,
}

/// Container health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSpec {
    /// Command executed inside the container.
    pub test: Vec<String>,
    /// Seconds between checks.
    pub interval_secs: u32,
    /// Seconds a single check may run.
    pub timeout_secs: u32,
    /// Consecutive failures before unhealthy.
    pub retries: u32,
    /// Grace period after start, in seconds.
    pub start_period_secs: u32,
}

/// Everything the runtime needs to create a container.
///
/// Generated once per container at topology build time and cached on the
/// `Container`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSpec {
    /// Runtime container name, `<group>-<container>`.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// User the entrypoint runs as.
    pub user: Option<String>,
    /// Bind mounts in `source:target:mode` form.
    pub binds: Vec<String>,
    /// Device mappings.
    pub devices: Vec<DeviceSpec>,
    /// Published ports.
    pub ports: Vec<PortSpec>,
    /// Sysctls.
    pub sysctls: BTreeMap<String, String>,
    /// Shared-memory size in bytes.
    pub shm_size_bytes: Option<i64>,
    /// Restart policy name.
    pub restart_policy: Option<String>,
    /// Health check.
    pub health: Option<HealthSpec>,
    /// Network attachment applied at create time.
    pub network: NetworkAttachment,
}

/// Everything the runtime needs to create a bridge network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Network name.
    pub name: String,
    /// Host bridge interface name.
    pub host_interface: String,
    /// IPv4 subnet in CIDR notation.
    pub subnet: String,
    /// Gateway address.
    pub gateway: String,
}

/// The operations the lifecycle engine needs from a container runtime.
///
/// Implementations must be `Send + Sync`; the engine itself issues calls
/// strictly sequentially.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Query the current state of a container by name.
    async fn container_status(&self, name: &str) -> PaddockResult<ContainerStatus>;

    /// Create a container.
    async fn create_container(&self, spec: &CreateSpec) -> PaddockResult<()>;

    /// Start a created container.
    async fn start_container(&self, name: &str) -> PaddockResult<()>;

    /// Gracefully stop a container within `timeout_secs`.
    async fn stop_container(&self, name: &str, timeout_secs: u32) -> PaddockResult<()>;

    /// Forcefully kill a container.
    async fn kill_container(&self, name: &str) -> PaddockResult<()>;

    /// Remove a container.
    async fn remove_container(&self, name: &str) -> PaddockResult<()>;

    /// Check whether an image is available locally.
    async fn image_present(&self, image: &str, platform: Option<&str>) -> PaddockResult<bool>;

    /// Pull an image.
    async fn pull_image(&self, image: &str, platform: Option<&str>) -> PaddockResult<()>;

    /// Check whether a network exists.
    async fn network_exists(&self, name: &str) -> PaddockResult<bool>;

    /// Create a bridge network.
    async fn create_network(&self, spec: &NetworkSpec) -> PaddockResult<()>;

    /// Remove a network.
    async fn remove_network(&self, name: &str) -> PaddockResult<()>;

    /// Connect a running or created container to a network.
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        ip: Option<Ipv4Addr>,
    ) -> PaddockResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(ContainerStatus::NotFound.to_string(), "not-found");
        assert_eq!(ContainerStatus::Running.to_string(), "running");
    }

    #[test]
    fn default_attachment_is_none() {
        assert_eq!(NetworkAttachment::default(), NetworkAttachment::None);
    }
}
