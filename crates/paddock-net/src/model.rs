//! Network topology types.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use paddock_common::ContainerRef;
use paddock_runtime::NetworkSpec;

/// A bridge-mode network with its own subnet and gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeNetwork {
    /// Network name, unique across both modes.
    pub name: String,
    /// Host bridge interface name, globally unique.
    pub host_interface: String,
    /// Priority; the lowest value marks a container's primary endpoint.
    pub priority: u32,
    /// The validated subnet.
    pub subnet: Ipv4Network,
    /// The gateway, always the network address plus one.
    pub gateway: Ipv4Addr,
}

impl BridgeNetwork {
    /// The creation request handed to the runtime client.
    #[must_use]
    pub fn to_spec(&self) -> NetworkSpec {
        NetworkSpec {
            name: self.name.clone(),
            host_interface: self.host_interface.clone(),
            subnet: self.subnet.to_string(),
            gateway: self.gateway.to_string(),
        }
    }
}

/// A container-mode network: attached containers join the target's network
/// namespace instead of getting their own address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNetwork {
    /// Network name, unique across both modes.
    pub name: String,
    /// The container whose stack is shared.
    pub target: ContainerRef,
    /// Containers joining the target's stack.
    pub attached: Vec<ContainerRef>,
}

/// A validated network of either mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    /// A bridge-mode network.
    Bridge(BridgeNetwork),
    /// A container-mode network.
    Container(ContainerNetwork),
}

impl Network {
    /// The network name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Bridge(net) => &net.name,
            Self::Container(net) => &net.name,
        }
    }

    /// The bridge form of this network, when it has one.
    #[must_use]
    pub const fn as_bridge(&self) -> Option<&BridgeNetwork> {
        match self {
            Self::Bridge(net) => Some(net),
            Self::Container(_) => None,
        }
    }
}

/// One bridge attachment of a container.
///
/// Endpoint lists are sorted ascending by priority; index 0 is the primary
/// endpoint attached natively at container-create time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// The bridge network name.
    pub network: String,
    /// Priority copied from the network, used to pick the primary endpoint.
    pub priority: u32,
    /// Static address inside the network, when assigned.
    pub ip: Option<Ipv4Addr>,
}

/// A container's membership in a container-mode network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedStack {
    /// The container-mode network name.
    pub network: String,
    /// The container whose stack is joined.
    pub target: ContainerRef,
}

/// The output of network validation.
#[derive(Debug, Clone, Default)]
pub struct NetworkModel {
    /// All networks by name.
    pub networks: BTreeMap<String, Network>,
    /// Bridge endpoints per container, sorted ascending by priority.
    pub endpoints: HashMap<ContainerRef, Vec<Endpoint>>,
    /// Shared-stack membership per attached container.
    pub shared_stacks: HashMap<ContainerRef, SharedStack>,
}
