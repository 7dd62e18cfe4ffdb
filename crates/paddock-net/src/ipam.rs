//! Network validation.
//!
//! Bridge-mode entries are walked first; the container-mode checks that
//! follow depend on the completed set of bridged containers.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use paddock_common::{ContainerRef, PaddockError, PaddockResult};
use paddock_config::{BridgeNetworkSettings, ContainerNetworkSettings, IpamSettings};

use crate::model::{BridgeNetwork, ContainerNetwork, Endpoint, Network, NetworkModel, SharedStack};

/// Longest prefix that still leaves room for a gateway and a container.
const MAX_PREFIX: u8 = 30;

/// Validate all network declarations and build the topology model.
pub fn build_networks(settings: &IpamSettings) -> PaddockResult<NetworkModel> {
    let mut model = NetworkModel::default();
    let mut host_interfaces = HashSet::new();

    for bridge in &settings.bridge {
        add_bridge_network(bridge, &mut model, &mut host_interfaces)?;
    }
    for shared in &settings.container {
        add_container_network(shared, &mut model)?;
    }

    finish_endpoints(&mut model)?;

    tracing::debug!(
        networks = model.networks.len(),
        attached_containers = model.endpoints.len(),
        "Validated network topology"
    );
    Ok(model)
}

fn config_err(network: &str, message: impl std::fmt::Display) -> PaddockError {
    PaddockError::config(format!("network \"{network}\": {message}"))
}

fn add_bridge_network(
    settings: &BridgeNetworkSettings,
    model: &mut NetworkModel,
    host_interfaces: &mut HashSet<String>,
) -> PaddockResult<()> {
    let name = &settings.name;
    if name.is_empty() {
        return Err(PaddockError::config("bridge network with an empty name"));
    }
    if model.networks.contains_key(name) {
        return Err(config_err(name, "duplicate network name"));
    }
    if settings.host_interface.is_empty() {
        return Err(config_err(name, "empty host interface name"));
    }
    if !host_interfaces.insert(settings.host_interface.clone()) {
        return Err(config_err(
            name,
            format!(
                "host interface \"{}\" already used by another network",
                settings.host_interface
            ),
        ));
    }
    if settings.priority == 0 {
        return Err(config_err(name, "priority must be a positive integer"));
    }

    let subnet = validate_cidr(name, &settings.cidr, &model.networks)?;
    let gateway = Ipv4Addr::from(u32::from(subnet.network()) + 1);

    let mut seen_containers = HashSet::new();
    let mut seen_ips = HashSet::new();
    for endpoint in &settings.containers {
        let reference = endpoint.reference();
        reference.validate(&format!("network \"{name}\""))?;
        if !seen_containers.insert(reference.clone()) {
            return Err(config_err(
                name,
                format!("container {reference} attached more than once"),
            ));
        }

        let ip = match &endpoint.ip {
            Some(raw) => {
                let ip: Ipv4Addr = raw.parse().map_err(|_| {
                    config_err(name, format!("invalid endpoint address \"{raw}\""))
                })?;
                if !subnet.contains(ip) {
                    return Err(config_err(
                        name,
                        format!("address {ip} is outside {subnet}"),
                    ));
                }
                if ip == subnet.network() {
                    return Err(config_err(
                        name,
                        format!("address {ip} is the network address"),
                    ));
                }
                if ip == gateway {
                    return Err(config_err(
                        name,
                        format!("address {ip} is the gateway address"),
                    ));
                }
                if !seen_ips.insert(ip) {
                    return Err(config_err(
                        name,
                        format!("address {ip} assigned more than once"),
                    ));
                }
                Some(ip)
            }
            None => None,
        };

        model.endpoints.entry(reference).or_default().push(Endpoint {
            network: name.clone(),
            priority: settings.priority,
            ip,
        });
    }

    model.networks.insert(
        name.clone(),
        Network::Bridge(BridgeNetwork {
            name: name.clone(),
            host_interface: settings.host_interface.clone(),
            priority: settings.priority,
            subnet,
            gateway,
        }),
    );
    Ok(())
}

fn validate_cidr(
    name: &str,
    raw: &str,
    accepted: &std::collections::BTreeMap<String, Network>,
) -> PaddockResult<Ipv4Network> {
    let subnet: Ipv4Network = raw
        .parse()
        .map_err(|_| config_err(name, format!("invalid IPv4 CIDR \"{raw}\"")))?;

    if subnet.prefix() > MAX_PREFIX {
        return Err(config_err(
            name,
            format!("prefix /{} is longer than /{MAX_PREFIX}", subnet.prefix()),
        ));
    }
    if subnet.ip() != subnet.network() {
        return Err(config_err(
            name,
            format!("{raw} is not a network address (expected {})", subnet.network()),
        ));
    }
    if !subnet.network().is_private() {
        return Err(config_err(
            name,
            format!("{raw} is outside the RFC1918 private ranges"),
        ));
    }

    for other in accepted.values() {
        if let Some(bridge) = other.as_bridge() {
            if overlaps(subnet, bridge.subnet) {
                return Err(config_err(
                    name,
                    format!(
                        "{raw} overlaps network \"{}\" ({})",
                        bridge.name, bridge.subnet
                    ),
                ));
            }
        }
    }

    Ok(subnet)
}

/// Two prefixes overlap when either contains the other's network address.
fn overlaps(a: Ipv4Network, b: Ipv4Network) -> bool {
    a.contains(b.network()) || b.contains(a.network())
}

fn add_container_network(
    settings: &ContainerNetworkSettings,
    model: &mut NetworkModel,
) -> PaddockResult<()> {
    let name = &settings.name;
    if name.is_empty() {
        return Err(PaddockError::config("container network with an empty name"));
    }
    if model.networks.contains_key(name) {
        return Err(config_err(name, "duplicate network name"));
    }
    settings.target.validate(&format!("network \"{name}\""))?;

    for attached in &settings.attached {
        attached.validate(&format!("network \"{name}\""))?;
        if *attached == settings.target {
            return Err(config_err(
                name,
                format!("container {attached} cannot share its own network stack"),
            ));
        }
        if let Some(existing) = model.shared_stacks.get(attached) {
            return Err(config_err(
                name,
                format!(
                    "container {attached} already shares the stack of network \"{}\"",
                    existing.network
                ),
            ));
        }
        if model.endpoints.contains_key(attached) {
            return Err(config_err(
                name,
                format!(
                    "container {attached} has bridge endpoints and cannot also share a network stack"
                ),
            ));
        }
        model.shared_stacks.insert(
            attached.clone(),
            SharedStack {
                network: name.clone(),
                target: settings.target.clone(),
            },
        );
    }

    model.networks.insert(
        name.clone(),
        Network::Container(ContainerNetwork {
            name: name.clone(),
            target: settings.target.clone(),
            attached: settings.attached.clone(),
        }),
    );
    Ok(())
}

/// Check priority distinctness for multi-homed containers and sort their
/// endpoints so that index 0 is the primary one.
fn finish_endpoints(model: &mut NetworkModel) -> PaddockResult<()> {
    for (reference, endpoints) in &mut model.endpoints {
        if endpoints.len() > 1 {
            let mut priorities: HashMap<u32, &str> = HashMap::new();
            for endpoint in endpoints.iter() {
                if let Some(other) = priorities.insert(endpoint.priority, &endpoint.network) {
                    return Err(PaddockError::config(format!(
                        "container {reference}: networks \"{}\" and \"{}\" share priority {}",
                        other, endpoint.network, endpoint.priority
                    )));
                }
            }
        }
        endpoints.sort_by_key(|e| e.priority);
    }
    Ok(())
}
