//! # paddock-common
//!
//! Shared types for the paddock topology manager.
//!
//! This crate provides functionality used across all paddock crates:
//! - Container references (the `<group>/<container>` identity key)
//! - Host facts (name, pretty name, address of the executing host)
//! - Memory quantity parsing
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod facts;
pub mod quantity;
pub mod reference;

pub use error::{PaddockError, PaddockResult};
pub use facts::HostFacts;
pub use quantity::MemoryQuantity;
pub use reference::ContainerRef;
