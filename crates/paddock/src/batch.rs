//! Batch orchestration over containers and networks.
//!
//! Batches run strictly sequentially in topology order. A failing entity
//! never cancels the rest of the batch; failures are collected and reported
//! as one aggregate error at the end.

use tracing::error;

use paddock_common::{PaddockError, PaddockResult};
use paddock_net::Network;
use paddock_runtime::RuntimeClient;

use crate::deployment::Deployment;

fn aggregate(
    action: &str,
    total: usize,
    failures: Vec<(String, PaddockError)>,
) -> PaddockResult<()> {
    if failures.is_empty() {
        return Ok(());
    }
    let details = failures
        .iter()
        .enumerate()
        .map(|(i, (name, err))| format!(" {}) {name}: {err}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    Err(PaddockError::Batch {
        action: action.to_string(),
        failed: failures.len(),
        total,
        details,
    })
}

impl Deployment {
    /// Start the selected containers in topology order.
    ///
    /// Returns whether any container was started.
    pub async fn start_containers(
        &self,
        runtime: &dyn RuntimeClient,
        all: bool,
        group: Option<&str>,
        container: Option<&str>,
    ) -> PaddockResult<bool> {
        let selected = self.query_containers(all, group, container)?;
        let total = selected.len();
        let mut failures = Vec::new();
        let mut changed = false;
        for target in selected {
            match self.start_container(target, runtime).await {
                Ok(started) => changed |= started,
                Err(err) => {
                    error!(container = %target.reference, error = %err, "start failed");
                    failures.push((target.runtime_name(), err));
                }
            }
        }
        aggregate("start", total, failures)?;
        Ok(changed)
    }

    /// Stop the selected containers.
    ///
    /// Uses the same ordering as start; a stopped topology reads the same way
    /// as a started one. Returns whether any container existed.
    pub async fn stop_containers(
        &self,
        runtime: &dyn RuntimeClient,
        all: bool,
        group: Option<&str>,
        container: Option<&str>,
    ) -> PaddockResult<bool> {
        let selected = self.query_containers(all, group, container)?;
        let total = selected.len();
        let mut failures = Vec::new();
        let mut existed = false;
        for target in selected {
            match self.stop_container(target, runtime).await {
                Ok(found) => existed |= found,
                Err(err) => {
                    error!(container = %target.reference, error = %err, "stop failed");
                    failures.push((target.runtime_name(), err));
                }
            }
        }
        aggregate("stop", total, failures)?;
        Ok(existed)
    }

    /// Purge the selected containers.
    ///
    /// Returns whether every selected container is gone; absent containers
    /// count as purged.
    pub async fn purge_containers(
        &self,
        runtime: &dyn RuntimeClient,
        all: bool,
        group: Option<&str>,
        container: Option<&str>,
    ) -> PaddockResult<bool> {
        let selected = self.query_containers(all, group, container)?;
        let total = selected.len();
        let mut failures = Vec::new();
        let mut purged = false;
        for target in selected {
            match self.purge_container(target, runtime).await {
                Ok(done) => purged |= done,
                Err(err) => {
                    error!(container = %target.reference, error = %err, "purge failed");
                    failures.push((target.runtime_name(), err));
                }
            }
        }
        aggregate("purge", total, failures)?;
        Ok(purged)
    }

    /// Create the runtime resources of one network, or of all of them.
    ///
    /// Returns whether anything was created.
    pub async fn create_networks(
        &self,
        runtime: &dyn RuntimeClient,
        name: Option<&str>,
    ) -> PaddockResult<bool> {
        let selected = self.query_networks(name)?;
        let total = selected.len();
        let mut failures = Vec::new();
        let mut changed = false;
        for network in selected {
            match self.create_network(network, runtime).await {
                Ok(created) => changed |= created,
                Err(err) => {
                    error!(network = %network.name(), error = %err, "network create failed");
                    failures.push((network.name().to_string(), err));
                }
            }
        }
        aggregate("network create", total, failures)?;
        Ok(changed)
    }

    /// Delete the runtime resources of one network, or of all of them.
    ///
    /// Returns whether anything was deleted.
    pub async fn delete_networks(
        &self,
        runtime: &dyn RuntimeClient,
        name: Option<&str>,
    ) -> PaddockResult<bool> {
        let selected = self.query_networks(name)?;
        let total = selected.len();
        let mut failures = Vec::new();
        let mut changed = false;
        for network in selected {
            match self.delete_network(network, runtime).await {
                Ok(deleted) => changed |= deleted,
                Err(err) => {
                    error!(network = %network.name(), error = %err, "network delete failed");
                    failures.push((network.name().to_string(), err));
                }
            }
        }
        aggregate("network delete", total, failures)?;
        Ok(changed)
    }

    fn query_networks(&self, name: Option<&str>) -> PaddockResult<Vec<&Network>> {
        match name {
            Some(name) => Ok(vec![self.query_network(name)?]),
            None => Ok(self.networks.values().collect()),
        }
    }
}
