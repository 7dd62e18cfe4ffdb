//! # paddock
//!
//! The topology and lifecycle core: builds a validated [`Deployment`] from a
//! merged configuration, and drives container and network lifecycle
//! operations against a [`paddock_runtime::RuntimeClient`].

#![warn(missing_docs)]

pub mod batch;
pub mod container;
pub mod deployment;
pub mod group;
pub mod lifecycle;

pub use container::Container;
pub use deployment::Deployment;
pub use group::ContainerGroup;
pub use lifecycle::PURGE_ATTEMPTS;
