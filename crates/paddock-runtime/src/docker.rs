//! Docker implementation of the runtime-client contract.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, NetworkingConfig,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{
    ContainerStateStatusEnum, DeviceMapping, EndpointIpamConfig, EndpointSettings, HealthConfig,
    HostConfig, Ipam, IpamConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use futures::StreamExt;

use paddock_common::{PaddockError, PaddockResult};

use crate::client::{ContainerStatus, CreateSpec, NetworkAttachment, NetworkSpec, RuntimeClient};

/// A [`RuntimeClient`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon with default settings.
    pub fn connect() -> PaddockResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| PaddockError::runtime(format!("failed to connect to Docker: {e}")))?;
        Ok(Self { docker })
    }

    /// Wrap an already-connected client.
    #[must_use]
    pub const fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn runtime_error(context: &str, err: &DockerError) -> PaddockError {
    PaddockError::runtime(format!("{context}, reason: {err}"))
}

fn map_status(status: Option<ContainerStateStatusEnum>) -> ContainerStatus {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerStatus::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerStatus::Restarting,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerStatus::Removing,
        Some(ContainerStateStatusEnum::EXITED) => ContainerStatus::Exited,
        Some(ContainerStateStatusEnum::DEAD) => ContainerStatus::Dead,
        Some(ContainerStateStatusEnum::EMPTY) | None => ContainerStatus::Unknown,
    }
}

fn restart_policy(name: &str) -> Option<RestartPolicy> {
    let name = match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => return None,
    };
    Some(RestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    })
}

fn container_config(spec: &CreateSpec) -> Config<String> {
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for port in &spec.ports {
        let key = format!("{}/{}", port.container_port, port.protocol);
        exposed_ports.insert(key.clone(), HashMap::new());
        let binding = PortBinding {
            host_ip: port.host_ip.clone(),
            host_port: Some(port.host_port.to_string()),
        };
        port_bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(binding);
    }

    let devices: Vec<DeviceMapping> = spec
        .devices
        .iter()
        .map(|d| DeviceMapping {
            path_on_host: Some(d.host_path.clone()),
            path_in_container: Some(d.container_path.clone()),
            cgroup_permissions: Some(d.permissions.clone()),
        })
        .collect();

    let (network_mode, networking_config, hostname) = match &spec.network {
        NetworkAttachment::None => (None, None, Some(spec.name.clone())),
        NetworkAttachment::Bridge { network, ip } => {
            let endpoint = EndpointSettings {
                ipam_config: ip.map(|ip| EndpointIpamConfig {
                    ipv4_address: Some(ip.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            let mut endpoints_config = HashMap::new();
            endpoints_config.insert(network.clone(), endpoint);
            (
                Some(network.clone()),
                Some(NetworkingConfig { endpoints_config }),
                Some(spec.name.clone()),
            )
        }
        // Hostname is owned by the target's namespace, Docker rejects it here.
        NetworkAttachment::SharedStack { container } => {
            (Some(format!("container:{container}")), None, None)
        }
    };

    let host_config = HostConfig {
        binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
        devices: (!devices.is_empty()).then_some(devices),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        sysctls: (!spec.sysctls.is_empty())
            .then(|| spec.sysctls.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        shm_size: spec.shm_size_bytes,
        restart_policy: spec.restart_policy.as_deref().and_then(restart_policy),
        network_mode,
        ..Default::default()
    };

    let healthcheck = spec.health.as_ref().map(|h| {
        let mut test = vec!["CMD".to_string()];
        test.extend(h.test.iter().cloned());
        HealthConfig {
            test: Some(test),
            interval: Some(i64::from(h.interval_secs) * 1_000_000_000),
            timeout: Some(i64::from(h.timeout_secs) * 1_000_000_000),
            retries: Some(i64::from(h.retries)),
            start_period: Some(i64::from(h.start_period_secs) * 1_000_000_000),
            ..Default::default()
        }
    });

    Config {
        image: Some(spec.image.clone()),
        hostname,
        user: spec.user.clone(),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        labels: (!spec.labels.is_empty())
            .then(|| spec.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        healthcheck,
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn container_status(&self, name: &str) -> PaddockResult<ContainerStatus> {
        match self.docker.inspect_container(name, None).await {
            Ok(inspect) => {
                let status = map_status(inspect.state.and_then(|s| s.status));
                tracing::trace!(container = %name, %status, "Inspected container");
                Ok(status)
            }
            Err(e) if is_not_found(&e) => Ok(ContainerStatus::NotFound),
            Err(e) => Err(runtime_error(
                &format!("failed to inspect container {name}"),
                &e,
            )),
        }
    }

    async fn create_container(&self, spec: &CreateSpec) -> PaddockResult<()> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| runtime_error(&format!("failed to create container {}", spec.name), &e))?;
        tracing::debug!(container = %spec.name, image = %spec.image, "Created container");
        Ok(())
    }

    async fn start_container(&self, name: &str) -> PaddockResult<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| runtime_error(&format!("failed to start container {name}"), &e))?;
        tracing::debug!(container = %name, "Started container");
        Ok(())
    }

    async fn stop_container(&self, name: &str, timeout_secs: u32) -> PaddockResult<()> {
        let options = StopContainerOptions {
            t: i64::from(timeout_secs),
        };
        self.docker
            .stop_container(name, Some(options))
            .await
            .map_err(|e| runtime_error(&format!("failed to stop container {name}"), &e))?;
        tracing::debug!(container = %name, "Stopped container");
        Ok(())
    }

    async fn kill_container(&self, name: &str) -> PaddockResult<()> {
        let options = KillContainerOptions { signal: "SIGKILL" };
        self.docker
            .kill_container(name, Some(options))
            .await
            .map_err(|e| runtime_error(&format!("failed to kill container {name}"), &e))?;
        tracing::debug!(container = %name, "Killed container");
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> PaddockResult<()> {
        let options = RemoveContainerOptions {
            force: false,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| runtime_error(&format!("failed to remove container {name}"), &e))?;
        tracing::debug!(container = %name, "Removed container");
        Ok(())
    }

    async fn image_present(&self, image: &str, _platform: Option<&str>) -> PaddockResult<bool> {
        let filters: HashMap<String, Vec<String>> =
            [("reference".to_string(), vec![image.to_string()])]
                .into_iter()
                .collect();
        let options = ListImagesOptions {
            filters,
            ..Default::default()
        };
        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| runtime_error(&format!("failed to list images for {image}"), &e))?;
        Ok(!images.is_empty())
    }

    async fn pull_image(&self, image: &str, platform: Option<&str>) -> PaddockResult<()> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            platform: platform.unwrap_or_default().to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!(image = %image, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(runtime_error(&format!("failed to pull image {image}"), &e));
                }
            }
        }

        tracing::debug!(image = %image, "Pulled image");
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> PaddockResult<bool> {
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![name.to_string()])]
                .into_iter()
                .collect();
        let options = ListNetworksOptions { filters };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(|e| runtime_error(&format!("failed to list networks for {name}"), &e))?;

        // The name filter matches substrings, so compare exactly.
        Ok(networks
            .iter()
            .any(|n| n.name.as_deref() == Some(name)))
    }

    async fn create_network(&self, spec: &NetworkSpec) -> PaddockResult<()> {
        let ipam = Ipam {
            driver: Some("default".to_string()),
            config: Some(vec![IpamConfig {
                subnet: Some(spec.subnet.clone()),
                gateway: Some(spec.gateway.clone()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let options: HashMap<String, String> = [(
            "com.docker.network.bridge.name".to_string(),
            spec.host_interface.clone(),
        )]
        .into_iter()
        .collect();

        let config = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: "bridge".to_string(),
            ipam,
            options,
            ..Default::default()
        };

        self.docker
            .create_network(config)
            .await
            .map_err(|e| runtime_error(&format!("failed to create network {}", spec.name), &e))?;
        tracing::debug!(network = %spec.name, subnet = %spec.subnet, "Created network");
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> PaddockResult<()> {
        self.docker
            .remove_network(name)
            .await
            .map_err(|e| runtime_error(&format!("failed to remove network {name}"), &e))?;
        tracing::debug!(network = %name, "Removed network");
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        ip: Option<Ipv4Addr>,
    ) -> PaddockResult<()> {
        let endpoint_config = EndpointSettings {
            ipam_config: ip.map(|ip| EndpointIpamConfig {
                ipv4_address: Some(ip.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config,
        };
        self.docker
            .connect_network(network, options)
            .await
            .map_err(|e| {
                runtime_error(
                    &format!("failed to connect container {container} to network {network}"),
                    &e,
                )
            })?;
        tracing::debug!(container = %container, network = %network, "Connected container to network");
        Ok(())
    }
}
