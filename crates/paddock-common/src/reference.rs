//! Container references.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PaddockError, PaddockResult};

/// The global identity key of a container: its group plus its name.
///
/// References are used as map keys throughout the topology and render as the
/// runtime container name `<group>-<container>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    /// The group the container belongs to.
    pub group: String,
    /// The container name within its group.
    pub container: String,
}

impl ContainerRef {
    /// Create a new reference.
    pub fn new(group: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            container: container.into(),
        }
    }

    /// Check that both fields are non-empty.
    ///
    /// `context` qualifies the error with the config location the reference
    /// came from.
    pub fn validate(&self, context: &str) -> PaddockResult<()> {
        if self.group.is_empty() {
            return Err(PaddockError::config(format!(
                "{context}: container reference has an empty group"
            )));
        }
        if self.container.is_empty() {
            return Err(PaddockError::config(format!(
                "{context}: container reference has an empty container name"
            )));
        }
        Ok(())
    }

    /// The name the container carries in the runtime: `<group>-<container>`.
    #[must_use]
    pub fn runtime_name(&self) -> String {
        format!("{}-{}", self.group, self.container)
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.group, self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_name_joins_group_and_container() {
        let r = ContainerRef::new("infra", "proxy");
        assert_eq!(r.runtime_name(), "infra-proxy");
        assert_eq!(r.to_string(), "infra-proxy");
    }

    #[test]
    fn validate_rejects_empty_fields() {
        let err = ContainerRef::new("", "proxy").validate("network \"lan\"");
        assert!(err.unwrap_err().to_string().contains("empty group"));

        let err = ContainerRef::new("infra", "").validate("network \"lan\"");
        assert!(err.unwrap_err().to_string().contains("empty container name"));
    }

    #[test]
    fn references_order_by_group_then_container() {
        let a = ContainerRef::new("a", "z");
        let b = ContainerRef::new("b", "a");
        assert!(a < b);
    }
}
