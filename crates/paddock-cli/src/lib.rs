//! # paddock-cli
//!
//! The command line surface of the paddock topology manager: loads and merges
//! YAML configuration files, builds the deployment topology and drives
//! lifecycle batches against the local Docker daemon.

#![warn(missing_docs)]

pub mod cli;
