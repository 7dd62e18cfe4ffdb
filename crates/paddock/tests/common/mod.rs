//! Shared test fixtures: a scriptable in-memory runtime and config helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

use async_trait::async_trait;

use paddock::Deployment;
use paddock_common::{HostFacts, PaddockError, PaddockResult};
use paddock_config::Config;
use paddock_runtime::{ContainerStatus, CreateSpec, NetworkSpec, RuntimeClient};

/// An in-memory runtime that records every call it receives.
///
/// Container state is scripted through [`MockRuntime::set_status`] and
/// advanced by the mutating calls the way a real runtime would.
pub struct MockRuntime {
    calls: Mutex<Vec<String>>,
    state: Mutex<HashMap<String, ContainerStatus>>,
    kills_needed: Mutex<HashMap<String, u32>>,
    failing_stops: Mutex<HashSet<String>>,
    images: Mutex<HashSet<String>>,
    networks: Mutex<HashSet<String>>,
    /// Whether a graceful stop actually stops the container.
    pub stop_is_effective: bool,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(HashMap::new()),
            kills_needed: Mutex::new(HashMap::new()),
            failing_stops: Mutex::new(HashSet::new()),
            images: Mutex::new(HashSet::new()),
            networks: Mutex::new(HashSet::new()),
            stop_is_effective: true,
        }
    }

    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        self.state.lock().unwrap().insert(name.to_string(), status);
    }

    /// Script a container that survives `n - 1` kills and disappears on the
    /// `n`-th.
    pub fn require_kills(&self, name: &str, n: u32) {
        self.kills_needed.lock().unwrap().insert(name.to_string(), n);
    }

    /// Make graceful stops of `name` fail with a runtime error.
    pub fn fail_stop(&self, name: &str) {
        self.failing_stops.lock().unwrap().insert(name.to_string());
    }

    pub fn add_image(&self, image: &str) {
        self.images.lock().unwrap().insert(image.to_string());
    }

    pub fn add_network(&self, name: &str) {
        self.networks.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The recorded calls without the read-only state queries.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                !c.starts_with("status ")
                    && !c.starts_with("image-present ")
                    && !c.starts_with("network-exists ")
            })
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn container_status(&self, name: &str) -> PaddockResult<ContainerStatus> {
        self.record(format!("status {name}"));
        Ok(self
            .state
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(ContainerStatus::NotFound))
    }

    async fn create_container(&self, spec: &CreateSpec) -> PaddockResult<()> {
        self.record(format!("create {}", spec.name));
        self.set_status(&spec.name, ContainerStatus::Created);
        Ok(())
    }

    async fn start_container(&self, name: &str) -> PaddockResult<()> {
        self.record(format!("start {name}"));
        self.set_status(name, ContainerStatus::Running);
        Ok(())
    }

    async fn stop_container(&self, name: &str, _timeout_secs: u32) -> PaddockResult<()> {
        self.record(format!("stop {name}"));
        if self.failing_stops.lock().unwrap().contains(name) {
            return Err(PaddockError::runtime(format!("cannot stop {name}")));
        }
        if self.stop_is_effective {
            self.set_status(name, ContainerStatus::Exited);
        }
        Ok(())
    }

    async fn kill_container(&self, name: &str) -> PaddockResult<()> {
        self.record(format!("kill {name}"));
        let mut kills = self.kills_needed.lock().unwrap();
        match kills.get_mut(name) {
            Some(left) if *left > 1 => *left -= 1,
            Some(_) => {
                kills.remove(name);
                self.state.lock().unwrap().remove(name);
            }
            None => self.set_status(name, ContainerStatus::Exited),
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> PaddockResult<()> {
        self.record(format!("remove {name}"));
        self.state.lock().unwrap().remove(name);
        Ok(())
    }

    async fn image_present(&self, image: &str, _platform: Option<&str>) -> PaddockResult<bool> {
        self.record(format!("image-present {image}"));
        Ok(self.images.lock().unwrap().contains(image))
    }

    async fn pull_image(&self, image: &str, _platform: Option<&str>) -> PaddockResult<()> {
        self.record(format!("pull {image}"));
        self.images.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> PaddockResult<bool> {
        self.record(format!("network-exists {name}"));
        Ok(self.networks.lock().unwrap().contains(name))
    }

    async fn create_network(&self, spec: &NetworkSpec) -> PaddockResult<()> {
        self.record(format!("create-network {}", spec.name));
        self.networks.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> PaddockResult<()> {
        self.record(format!("remove-network {name}"));
        self.networks.lock().unwrap().remove(name);
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        _ip: Option<Ipv4Addr>,
    ) -> PaddockResult<()> {
        self.record(format!("connect {network} {container}"));
        Ok(())
    }
}

pub fn facts() -> HostFacts {
    HostFacts {
        host_name: "host-a".to_string(),
        pretty_name: "host-a".to_string(),
        address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
    }
}

/// Build a deployment from YAML, substituting `BASE` with a scratch
/// directory. Purge delays are zeroed so the tests run instantly.
pub fn deployment(yaml: &str) -> (Deployment, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "global:\n  base_dir: {}\n  defaults:\n    purge_delay_ms: 0\n{yaml}",
        dir.path().to_str().unwrap()
    );
    let config = Config::from_yaml(&yaml).unwrap();
    let deployment = Deployment::from_config(&config, &facts()).unwrap();
    (deployment, dir)
}
