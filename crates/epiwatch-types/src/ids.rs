//! Node identifiers.
//!
//! Every process in the simulation -- the overseer included -- is known by
//! a [`NodeId`] assigned in the deployment configuration. Identifiers are
//! plain strings chosen by the operator (e.g. `"emr_midtown"`), so the
//! newtype exists purely to prevent accidental mixing with disease names
//! and endpoint subjects at compile time.

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the simulation.
///
/// Node ids are operator-assigned configuration strings, not generated
/// values. They key the overseer's address registry, the ready set, the
/// heartbeat table, and every vector clock in the system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn id_display_matches_inner() {
        let id = NodeId::new("hds_central");
        assert_eq!(id.to_string(), "hds_central");
        assert_eq!(id.as_str(), "hds_central");
    }

    #[test]
    fn id_serializes_as_bare_string() {
        let id = NodeId::new("emr_1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"emr_1\"");
        let restored: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, id);
    }
}
