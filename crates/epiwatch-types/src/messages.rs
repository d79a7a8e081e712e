//! Wire message types and protocol constants.
//!
//! Every message is a tagged variant over the enumerated message kinds,
//! carried as JSON with a `message_type` tag whose value is one of the
//! protocol's fixed string literals (`ready_to_start`, `heartbeat`,
//! `start_simulation`, ...). Handlers match exhaustively on the variants
//! they serve; payloads that fail to decode are logged and dropped by the
//! receiving loop.
//!
//! Messages are grouped by channel:
//!
//! - [`ControlEnvelope`] / [`ControlReply`] -- the node-to-overseer
//!   request/reply control plane. The envelope carries the sender's id so
//!   multiplexed replies route back to the right waiter.
//! - [`Broadcast`] -- the overseer's fan-out channel to all nodes.
//! - [`CaseReportRequest`] / [`CaseReportReply`] -- the record-source to
//!   district-aggregator request/reply link.
//! - [`FanoutMessage`] -- peer fan-out traffic: daily counts from
//!   aggregators, outbreak alerts from analyzers.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::{AddressRegistry, NodeAddress};
use crate::ids::NodeId;
use crate::vector_clock::VectorClock;

/// Subject on which the overseer serves control requests.
pub const CONTROL_SUBJECT: &str = "overseer.control";

/// Subject on which the overseer publishes broadcast messages.
pub const BROADCAST_SUBJECT: &str = "overseer.broadcast";

/// Bounded wait for each poll-loop iteration, so overseer broadcasts are
/// never starved by peer traffic and periodic duties run even when idle.
pub const POLL_INTERVAL: Duration = Duration::from_millis(700);

/// Wall-clock interval between node heartbeats to the overseer, and
/// between overseer heartbeat broadcasts during the run phase.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Heartbeat age past which the overseer reports a node as missing
/// (three missed beats).
pub const HEARTBEAT_MISS_THRESHOLD: Duration = Duration::from_secs(15);

/// Status literal acked for well-formed control requests.
pub const ACK_SUCCESS: &str = "success";

/// The case-reports request/reply subject served by a district
/// aggregator.
pub fn case_reports_subject(node_id: &NodeId) -> String {
    format!("node.{node_id}.case-reports")
}

/// The daily-counts fan-out subject published by a district aggregator.
pub fn daily_counts_subject(node_id: &NodeId) -> String {
    format!("node.{node_id}.daily-counts")
}

/// The outbreak-alerts fan-out subject published by an outbreak analyzer.
pub fn outbreak_alerts_subject(node_id: &NodeId) -> String {
    format!("node.{node_id}.outbreak-alerts")
}

/// A control-plane request from a node to the overseer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Registration: the node's address map (role + endpoints).
    AddressMap(NodeAddress),
    /// The node has wired its peers and is ready to start.
    ReadyToStart,
    /// Periodic liveness signal during the run phase.
    Heartbeat,
    /// Operator-initiated remote shutdown relayed through a node.
    StopSimulation,
    /// The node has shut down its role traffic and is leaving.
    Deregister,
}

/// Envelope around every control request, tagging it with the sender so
/// the overseer can address its reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    /// The requesting node.
    pub node_id: NodeId,
    /// The request body.
    pub request: ControlRequest,
}

/// The overseer's reply to a control request.
///
/// `node_id` names the requester the reply is addressed to; a node that
/// receives a reply naming someone else must keep waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    /// The node this reply is addressed to.
    pub node_id: NodeId,
    /// Status literal, or a diagnostic for protocol violations.
    pub status: String,
}

/// A message published on the overseer's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Broadcast {
    /// The one-shot full address registry, sent once registration
    /// completes.
    AddressMap {
        /// Every registered node id mapped to its address.
        nodes: AddressRegistry,
    },
    /// All nodes transition to RUNNING.
    StartSimulation,
    /// All nodes transition to STOPPING.
    StopSimulation,
    /// Overseer liveness signal republished during the run phase.
    Heartbeat,
}

/// A request from a record source to its district aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum CaseReportRequest {
    /// A single disease occurrence observed by a record source.
    DiseaseNotification {
        /// The reporting record source.
        record_source_id: NodeId,
        /// The disease observed.
        disease: String,
        /// The sender's simulated timestamp at occurrence time.
        local_timestamp: DateTime<Utc>,
        /// The sender's clock snapshot.
        vector_clock: VectorClock,
    },
    /// A query for the aggregator's current outbreak set.
    OutbreakQuery {
        /// The querying record source.
        record_source_id: NodeId,
        /// The sender's clock snapshot.
        vector_clock: VectorClock,
    },
}

/// A district aggregator's reply on the case-reports link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum CaseReportReply {
    /// Acknowledges a disease notification.
    DiseaseNotificationReply {
        /// Status literal.
        status: String,
        /// The aggregator's clock snapshot after handling.
        vector_clock: VectorClock,
    },
    /// Answers an outbreak query.
    OutbreakQueryReply {
        /// Diseases currently under active alert in this district.
        outbreaks: BTreeSet<String>,
        /// The aggregator's clock snapshot after handling.
        vector_clock: VectorClock,
    },
}

/// Peer fan-out traffic: aggregator daily counts and analyzer alerts.
///
/// Subscribers match on the variants their role serves; an aggregator
/// receiving anything but an alert (or an analyzer anything but a daily
/// count) treats it as an unrecognized kind, logs a warning, and drops
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum FanoutMessage {
    /// A district aggregator's disease counts for the current simulated
    /// day.
    DailyDiseaseCount {
        /// The reporting aggregator.
        district_aggregator_id: NodeId,
        /// Simulated timestamp at which this day's counting began.
        start_timestamp: DateTime<Utc>,
        /// Simulated timestamp as of this report.
        end_timestamp: DateTime<Utc>,
        /// Occurrences counted per disease so far today.
        counts: BTreeMap<String, u64>,
        /// The aggregator's clock snapshot.
        vector_clock: VectorClock,
    },
    /// An outbreak analyzer's threshold alert.
    DiseaseOutbreakAlert {
        /// The disease whose daily total crossed the threshold.
        disease: String,
        /// The analyzer's clock snapshot.
        vector_clock: VectorClock,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::roles::Role;

    #[test]
    fn control_tokens_use_the_fixed_literals() {
        let ready = serde_json::to_value(ControlRequest::ReadyToStart).unwrap();
        assert_eq!(ready, serde_json::json!({"message_type": "ready_to_start"}));

        let heartbeat = serde_json::to_value(ControlRequest::Heartbeat).unwrap();
        assert_eq!(heartbeat, serde_json::json!({"message_type": "heartbeat"}));

        let deregister = serde_json::to_value(ControlRequest::Deregister).unwrap();
        assert_eq!(deregister, serde_json::json!({"message_type": "deregister"}));
    }

    #[test]
    fn broadcast_tokens_use_the_fixed_literals() {
        let start = serde_json::to_value(Broadcast::StartSimulation).unwrap();
        assert_eq!(start, serde_json::json!({"message_type": "start_simulation"}));

        let stop = serde_json::to_value(Broadcast::StopSimulation).unwrap();
        assert_eq!(stop, serde_json::json!({"message_type": "stop_simulation"}));
    }

    #[test]
    fn registration_carries_role_and_endpoints() {
        let envelope = ControlEnvelope {
            node_id: NodeId::new("emr_1"),
            request: ControlRequest::AddressMap(NodeAddress::without_endpoints(
                Role::RecordSource,
            )),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "node_id": "emr_1",
                "request": {
                    "message_type": "address_map",
                    "role": "record_source",
                    "endpoints": {}
                }
            })
        );

        let restored: ControlEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(restored, envelope);
    }

    #[test]
    fn notification_round_trips_with_clock() {
        let mut clock = VectorClock::new();
        clock.increment(&NodeId::new("emr_1"));

        let request = CaseReportRequest::DiseaseNotification {
            record_source_id: NodeId::new("emr_1"),
            disease: "measles".to_owned(),
            local_timestamp: Utc::now(),
            vector_clock: clock,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"message_type\":\"disease_notification\""));

        let restored: CaseReportRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, request);
    }

    #[test]
    fn unrecognized_kind_fails_to_decode() {
        // The receiving loop maps this error to warn-and-drop.
        let json = serde_json::json!({"message_type": "census_report", "count": 3});
        let result: Result<FanoutMessage, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn peer_subjects_embed_the_node_id() {
        let id = NodeId::new("hds_1");
        assert_eq!(case_reports_subject(&id), "node.hds_1.case-reports");
        assert_eq!(daily_counts_subject(&id), "node.hds_1.daily-counts");
        assert_eq!(outbreak_alerts_subject(&id), "node.hds_1.outbreak-alerts");
    }
}
