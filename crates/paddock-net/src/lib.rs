//! # paddock-net
//!
//! The validated network topology model: bridge-mode networks with their
//! CIDR/gateway addressing, container-mode (shared stack) declarations, and
//! the per-container endpoint lists the lifecycle engine attaches at create
//! time.

#![warn(missing_docs)]

pub mod ipam;
pub mod model;

pub use ipam::build_networks;
pub use model::{BridgeNetwork, ContainerNetwork, Endpoint, Network, NetworkModel, SharedStack};
