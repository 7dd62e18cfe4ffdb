//! # paddock-runtime
//!
//! The narrow runtime-client contract the lifecycle engine drives, plus its
//! Docker implementation.
//!
//! The core never talks to a container runtime directly; it only depends on
//! [`RuntimeClient`]. Tests substitute a mock, production wires in
//! [`DockerRuntime`].

#![warn(missing_docs)]

pub mod client;
pub mod docker;

pub use client::{
    ContainerStatus, CreateSpec, DeviceSpec, HealthSpec, NetworkAttachment, NetworkSpec,
    PortSpec, RuntimeClient,
};
pub use docker::DockerRuntime;
