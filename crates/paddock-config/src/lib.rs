//! # paddock-config
//!
//! The merged configuration object consumed by the topology builder, plus the
//! layered env templater that resolves `$$KEY$$` tokens inside it.
//!
//! Loading and merging YAML files happens at the CLI edge; the core crates
//! only ever see the typed [`Config`] value.

#![warn(missing_docs)]

pub mod model;
pub mod template;

pub use model::{
    BridgeNetworkSettings, Config, ContainerDefaults, ContainerNetworkSettings,
    ContainerSettings, DeviceSettings, EndpointSettings, EnvEntry, GlobalSettings,
    GroupSettings, HealthSettings, HostEntry, ImageSettings, IpamSettings, MountSettings,
    PortSettings, PullPolicy,
};
pub use template::EnvTemplate;
