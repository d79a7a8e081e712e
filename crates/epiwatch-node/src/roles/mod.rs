//! Role drivers: transport wiring and poll loops for the three roles.
//!
//! Each driver resolves its peers from the broadcast address registry,
//! completes the readiness barrier, and then multiplexes the overseer
//! broadcast channel with its peer channels under the bounded poll
//! interval until `stop_simulation` arrives. The protocol state itself
//! lives in `epiwatch-roles`; drivers only move messages.

pub mod district_aggregator;
pub mod outbreak_analyzer;
pub mod record_source;

use std::collections::BTreeMap;

use epiwatch_core::config::NodeConfig;
use epiwatch_types::address::{
    CASE_REPORTS_ENDPOINT, DAILY_COUNTS_ENDPOINT, OUTBREAK_ALERTS_ENDPOINT,
};
use epiwatch_types::messages::{
    case_reports_subject, daily_counts_subject, outbreak_alerts_subject,
};
use epiwatch_types::{NodeAddress, Role};

/// Build the address this node registers: its role tag plus the named
/// endpoint subjects it will serve. Built once, immutable afterwards.
///
/// Record sources dial out only and register an empty endpoint map; the
/// other roles derive their serving subjects from their node id.
pub fn setup_listeners(config: &NodeConfig) -> NodeAddress {
    match config.role {
        Role::RecordSource => NodeAddress::without_endpoints(Role::RecordSource),
        Role::DistrictAggregator => {
            let mut endpoints = BTreeMap::new();
            endpoints.insert(
                CASE_REPORTS_ENDPOINT.to_owned(),
                case_reports_subject(&config.node_id),
            );
            endpoints.insert(
                DAILY_COUNTS_ENDPOINT.to_owned(),
                daily_counts_subject(&config.node_id),
            );
            NodeAddress::new(Role::DistrictAggregator, endpoints)
        }
        Role::OutbreakAnalyzer => {
            let mut endpoints = BTreeMap::new();
            endpoints.insert(
                OUTBREAK_ALERTS_ENDPOINT.to_owned(),
                outbreak_alerts_subject(&config.node_id),
            );
            NodeAddress::new(Role::OutbreakAnalyzer, endpoints)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn aggregator_config() -> NodeConfig {
        NodeConfig::from_yaml(
            r#"
node_id: hds_1
role: district_aggregator
role_parameters:
  district_aggregator:
    daily_count_send_frequency_hours: 2.0
connections: [doa_1]
diseases: [measles]
time_scaling_factor: 1800.0
"#,
        )
        .unwrap()
    }

    #[test]
    fn aggregator_registers_both_served_endpoints() {
        let address = setup_listeners(&aggregator_config());
        assert_eq!(
            address.endpoint(CASE_REPORTS_ENDPOINT),
            Some("node.hds_1.case-reports")
        );
        assert_eq!(
            address.endpoint(DAILY_COUNTS_ENDPOINT),
            Some("node.hds_1.daily-counts")
        );
        assert_eq!(address.known_role(), Some(Role::DistrictAggregator));
    }
}
