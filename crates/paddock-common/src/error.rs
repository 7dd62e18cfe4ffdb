//! Common error types for the paddock ecosystem.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`PaddockError`].
pub type PaddockResult<T> = Result<T, PaddockError>;

/// Common errors across the paddock ecosystem.
#[derive(Error, Diagnostic, Debug)]
pub enum PaddockError {
    /// Configuration error found while validating the topology.
    ///
    /// Configuration errors abort the deployment build and are never retried.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(paddock::config))]
    Config {
        /// Location-qualified description of the problem.
        message: String,
    },

    /// Failure reported by the container runtime.
    #[error("Runtime error: {message}")]
    #[diagnostic(code(paddock::runtime))]
    Runtime {
        /// Context-wrapped description of the failed operation.
        message: String,
    },

    /// Group not found by a selector.
    #[error("Group not found: {name}")]
    #[diagnostic(code(paddock::group::not_found))]
    GroupNotFound {
        /// The group name that was not found.
        name: String,
    },

    /// Container not found by a selector.
    #[error("Container not found: {name}")]
    #[diagnostic(code(paddock::container::not_found))]
    ContainerNotFound {
        /// The container name that was not found.
        name: String,
    },

    /// Network not found by a selector.
    #[error("Network not found: {name}")]
    #[diagnostic(code(paddock::network::not_found))]
    NetworkNotFound {
        /// The network name that was not found.
        name: String,
    },

    /// One or more actions of a batch failed.
    #[error("{failed} of {total} {action} action(s) failed:\n{details}")]
    #[diagnostic(code(paddock::batch))]
    Batch {
        /// The batch action that was applied.
        action: String,
        /// Number of failed entities.
        failed: usize,
        /// Number of attempted entities.
        total: usize,
        /// Numbered list of per-entity failure reasons.
        details: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(paddock::io))]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(paddock::internal),
        help("This is a bug, please report it at https://github.com/paddock-containers/paddock/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl PaddockError {
    /// Build a [`PaddockError::Config`] from a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Build a [`PaddockError::Runtime`] from a formatted message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Build a [`PaddockError::Internal`] from a formatted message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
