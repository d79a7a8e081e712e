//! Node addresses and the overseer's address registry.
//!
//! During listener setup each node builds one [`NodeAddress`] describing
//! the endpoints it serves, submits it with its registration request, and
//! never changes it again. The overseer collects valid submissions into
//! an [`AddressRegistry`] and broadcasts the complete registry exactly
//! once, after which every node resolves its peers from the map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::roles::Role;

/// Endpoint name under which a district aggregator serves record-source
/// requests.
pub const CASE_REPORTS_ENDPOINT: &str = "case_reports";

/// Endpoint name under which a district aggregator publishes daily counts.
pub const DAILY_COUNTS_ENDPOINT: &str = "daily_counts";

/// Endpoint name under which an outbreak analyzer publishes alerts.
pub const OUTBREAK_ALERTS_ENDPOINT: &str = "outbreak_alerts";

/// The full registry broadcast by the overseer once registration
/// completes: every registered node id mapped to its address.
pub type AddressRegistry = BTreeMap<NodeId, NodeAddress>;

/// A node's registered address: its role tag plus zero or more named
/// endpoint subjects.
///
/// The role travels as a raw tag rather than a [`Role`] because the wire
/// is untrusted: the overseer validates the tag on receipt and excludes
/// registrations naming a role it does not recognize. Record sources dial
/// out only, so they register an empty endpoint map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// The snake_case role tag as submitted by the node.
    pub role: String,
    /// Named endpoint subjects served by this node.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl NodeAddress {
    /// Build an address for a node playing `role` with the given named
    /// endpoints.
    pub fn new(role: Role, endpoints: BTreeMap<String, String>) -> Self {
        Self {
            role: role.tag().to_owned(),
            endpoints,
        }
    }

    /// Build an address with no served endpoints (record sources).
    pub fn without_endpoints(role: Role) -> Self {
        Self::new(role, BTreeMap::new())
    }

    /// The validated role, if the stored tag names a known one.
    pub fn known_role(&self) -> Option<Role> {
        Role::from_tag(&self.role)
    }

    /// Look up a named endpoint subject.
    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.endpoints.get(name).map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn record_source_address_has_no_endpoints() {
        let address = NodeAddress::without_endpoints(Role::RecordSource);
        assert_eq!(address.known_role(), Some(Role::RecordSource));
        assert!(address.endpoints.is_empty());
        assert_eq!(address.endpoint(CASE_REPORTS_ENDPOINT), None);
    }

    #[test]
    fn endpoints_resolve_by_name() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            CASE_REPORTS_ENDPOINT.to_owned(),
            "node.hds_1.case-reports".to_owned(),
        );
        let address = NodeAddress::new(Role::DistrictAggregator, endpoints);

        assert_eq!(
            address.endpoint(CASE_REPORTS_ENDPOINT),
            Some("node.hds_1.case-reports")
        );
    }

    #[test]
    fn unknown_role_tag_survives_deserialization_but_fails_validation() {
        // Registration payloads with made-up roles must parse so the
        // overseer can ack them; validation happens separately.
        let json = r#"{"role": "pharmacy", "endpoints": {}}"#;
        let address: NodeAddress = serde_json::from_str(json).unwrap();
        assert_eq!(address.known_role(), None);
    }
}
