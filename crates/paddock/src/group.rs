//! Container groups.

use std::collections::BTreeMap;

use crate::container::Container;

/// A validated container group.
#[derive(Debug, Clone)]
pub struct ContainerGroup {
    /// Group name, unique across the deployment.
    pub name: String,
    /// Cross-group sequencing order; lower starts first.
    pub order: u32,
    /// Containers of this group by name.
    pub containers: BTreeMap<String, Container>,
}

impl ContainerGroup {
    pub(crate) fn new(name: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            order,
            containers: BTreeMap::new(),
        }
    }
}
