//! The container lifecycle engine.
//!
//! All operations are idempotent against observed runtime state: they query
//! first, act only when the state requires it, and report what they observed.
//! Stop reports whether the container existed, purge whether it is gone and
//! start whether it was started.

use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use paddock_common::{PaddockError, PaddockResult};
use paddock_config::PullPolicy;
use paddock_net::Network;
use paddock_runtime::{ContainerStatus, RuntimeClient};

use crate::container::Container;
use crate::deployment::Deployment;

/// Upper bound of stop and kill actions a single purge may issue.
pub const PURGE_ATTEMPTS: u32 = 6;

/// Tracks the escalation state of one purge.
///
/// The first action against a running container is always one graceful stop;
/// every following action is a kill. Waits on externally removed containers
/// consume attempts too, so a purge always terminates.
struct PurgeGate {
    stop_issued: bool,
    attempts_left: u32,
}

enum PurgeAction {
    Stop,
    Kill,
    Remove,
    Wait,
}

impl Deployment {
    /// Start a container, creating it from scratch.
    ///
    /// Runs the pre-hook, applies the pull policy, purges any previous
    /// incarnation, ensures the bridge networks exist and creates, connects
    /// and starts the container. Returns `false` without touching the runtime
    /// when the host allow-list excludes the container.
    pub async fn start_container(
        &self,
        container: &Container,
        runtime: &dyn RuntimeClient,
    ) -> PaddockResult<bool> {
        let name = container.runtime_name();
        if !container.allowed_on_host {
            info!(container = %name, "not allowed on this host, skipping");
            return Ok(false);
        }

        run_pre_hook(container).await?;
        pull_image(container, runtime).await?;
        self.purge_container(container, runtime).await?;

        if let Some(primary) = container.primary_endpoint() {
            self.ensure_network(&primary.network, runtime).await?;
        } else if container.shared_stack.is_none() {
            warn!(container = %name, "container has no network attachment");
        }

        info!(container = %name, image = %container.create_spec.image, "creating container");
        runtime.create_container(&container.create_spec).await?;

        for endpoint in container.secondary_endpoints() {
            self.ensure_network(&endpoint.network, runtime).await?;
            runtime
                .connect_network(&endpoint.network, &name, endpoint.ip)
                .await?;
        }

        runtime.start_container(&name).await?;
        info!(container = %name, "container started");
        Ok(true)
    }

    /// Gracefully stop a container.
    ///
    /// Returns whether the container existed. Containers that exist but are
    /// not running are left untouched.
    pub async fn stop_container(
        &self,
        container: &Container,
        runtime: &dyn RuntimeClient,
    ) -> PaddockResult<bool> {
        let name = container.runtime_name();
        let status = runtime.container_status(&name).await?;
        if status == ContainerStatus::NotFound {
            debug!(container = %name, "container is absent, nothing to stop");
            return Ok(false);
        }

        match status {
            ContainerStatus::Running
            | ContainerStatus::Paused
            | ContainerStatus::Restarting => {
                if container.settings.image.refresh_before_stop {
                    // Upgrade-on-restart flow: fetch the fresh image while the
                    // old container still runs. A failed refresh never fails
                    // the stop.
                    let image = &container.create_spec.image;
                    info!(container = %name, image = %image, "refreshing image before stop");
                    if let Err(err) =
                        runtime.pull_image(image, container.platform.as_deref()).await
                    {
                        warn!(container = %name, error = %err, "image refresh failed");
                    }
                }
                info!(container = %name, "stopping container");
                runtime
                    .stop_container(&name, container.stop_timeout_secs)
                    .await?;
                Ok(true)
            }
            ContainerStatus::Unknown => Err(unknown_state(&name)),
            _ => {
                debug!(container = %name, state = %status, "container is not running");
                Ok(true)
            }
        }
    }

    /// Remove a container and whatever is left of a previous incarnation.
    ///
    /// Escalates from one graceful stop through kills, bounded by
    /// [`PURGE_ATTEMPTS`] actions. Returns `true` once the container is gone;
    /// purging an absent container succeeds without any mutating call.
    pub async fn purge_container(
        &self,
        container: &Container,
        runtime: &dyn RuntimeClient,
    ) -> PaddockResult<bool> {
        let name = container.runtime_name();
        let delay = Duration::from_millis(container.purge_delay_ms);
        let mut gate = PurgeGate {
            stop_issued: false,
            attempts_left: PURGE_ATTEMPTS,
        };

        loop {
            let action = match runtime.container_status(&name).await? {
                ContainerStatus::NotFound => return Ok(true),
                ContainerStatus::Unknown => return Err(unknown_state(&name)),
                ContainerStatus::Running
                | ContainerStatus::Paused
                | ContainerStatus::Restarting => {
                    if gate.stop_issued {
                        PurgeAction::Kill
                    } else {
                        PurgeAction::Stop
                    }
                }
                ContainerStatus::Created | ContainerStatus::Exited | ContainerStatus::Dead => {
                    PurgeAction::Remove
                }
                ContainerStatus::Removing => PurgeAction::Wait,
            };

            if gate.attempts_left == 0 {
                break;
            }

            match action {
                PurgeAction::Stop => {
                    gate.stop_issued = true;
                    // The graceful stop resets the budget: it takes the first
                    // slot itself, the kills that follow get the rest.
                    gate.attempts_left = PURGE_ATTEMPTS - 1;
                    debug!(container = %name, "purge: stopping container");
                    if let Err(err) = runtime
                        .stop_container(&name, container.stop_timeout_secs)
                        .await
                    {
                        warn!(container = %name, error = %err, "graceful stop failed, escalating to kill");
                    }
                }
                PurgeAction::Kill => {
                    gate.attempts_left -= 1;
                    debug!(container = %name, "purge: killing container");
                    if let Err(err) = runtime.kill_container(&name).await {
                        debug!(container = %name, error = %err, "kill failed, re-checking state");
                    }
                }
                PurgeAction::Remove => {
                    gate.attempts_left -= 1;
                    debug!(container = %name, "purge: removing container");
                    runtime.remove_container(&name).await?;
                }
                PurgeAction::Wait => {
                    gate.attempts_left -= 1;
                    debug!(container = %name, "container is being removed externally, waiting");
                }
            }

            tokio::time::sleep(delay).await;
        }

        // Budget exhausted; one final observation decides the outcome.
        match runtime.container_status(&name).await? {
            ContainerStatus::NotFound => Ok(true),
            status => Err(PaddockError::runtime(format!(
                "failed to purge container {name} after {PURGE_ATTEMPTS} attempts (last state: {status})"
            ))),
        }
    }

    /// Create the runtime resources of a network.
    ///
    /// Container-mode networks have no runtime resources of their own.
    /// Returns whether anything was created.
    pub async fn create_network(
        &self,
        network: &Network,
        runtime: &dyn RuntimeClient,
    ) -> PaddockResult<bool> {
        match network {
            Network::Bridge(bridge) => {
                if runtime.network_exists(&bridge.name).await? {
                    info!(network = %bridge.name, "network already exists");
                    Ok(false)
                } else {
                    info!(network = %bridge.name, subnet = %bridge.subnet, "creating network");
                    runtime.create_network(&bridge.to_spec()).await?;
                    Ok(true)
                }
            }
            Network::Container(net) => {
                debug!(network = %net.name, "container-mode network needs no runtime resources");
                Ok(false)
            }
        }
    }

    /// Delete the runtime resources of a network.
    ///
    /// Returns whether anything was deleted.
    pub async fn delete_network(
        &self,
        network: &Network,
        runtime: &dyn RuntimeClient,
    ) -> PaddockResult<bool> {
        match network {
            Network::Bridge(bridge) => {
                if runtime.network_exists(&bridge.name).await? {
                    info!(network = %bridge.name, "deleting network");
                    runtime.remove_network(&bridge.name).await?;
                    Ok(true)
                } else {
                    debug!(network = %bridge.name, "network is absent, nothing to delete");
                    Ok(false)
                }
            }
            Network::Container(_) => Ok(false),
        }
    }

    /// Make sure a bridge network referenced by an endpoint exists.
    async fn ensure_network(&self, name: &str, runtime: &dyn RuntimeClient) -> PaddockResult<()> {
        let bridge = self
            .networks
            .get(name)
            .and_then(Network::as_bridge)
            .ok_or_else(|| {
                PaddockError::internal(format!(
                    "endpoint references network \"{name}\" missing from the topology"
                ))
            })?;
        if runtime.network_exists(&bridge.name).await? {
            debug!(network = %bridge.name, "network already exists");
        } else {
            info!(network = %bridge.name, subnet = %bridge.subnet, "creating network");
            runtime.create_network(&bridge.to_spec()).await?;
        }
        Ok(())
    }
}

fn unknown_state(name: &str) -> PaddockError {
    PaddockError::internal(format!(
        "container \"{name}\" reported an unrecognised state"
    ))
}

async fn run_pre_hook(container: &Container) -> PaddockResult<()> {
    let Some((program, args)) = container.settings.start_pre_hook.split_first() else {
        return Ok(());
    };
    info!(container = %container.reference, command = %program, "running start pre-hook");
    let status = Command::new(program).args(args).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(PaddockError::runtime(format!(
            "start pre-hook for container {} failed ({status})",
            container.reference
        )))
    }
}

async fn pull_image(container: &Container, runtime: &dyn RuntimeClient) -> PaddockResult<()> {
    let image = &container.create_spec.image;
    let platform = container.platform.as_deref();

    let wanted = match container.pull {
        PullPolicy::Always => true,
        PullPolicy::IfMissing => !runtime.image_present(image, platform).await?,
        PullPolicy::Never => false,
    };
    if !wanted {
        return Ok(());
    }

    info!(image = %image, "pulling image");
    match runtime.pull_image(image, platform).await {
        Ok(()) => Ok(()),
        Err(err) if container.settings.image.ignore_pull_failure => {
            warn!(image = %image, error = %err, "image pull failed, continuing");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
