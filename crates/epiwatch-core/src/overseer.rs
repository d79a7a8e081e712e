//! Overseer coordination state: barriers and the heartbeat table.
//!
//! The overseer binary walks seven strictly-sequential phases; this
//! module owns the bookkeeping those phases gate on. Completeness is
//! counted, never assumed: the register phase completes exactly when the
//! registry holds as many entries as nodes were configured, the ready
//! barrier when the ready set does, and the deregister phase when the
//! registry has emptied entry by entry.
//!
//! Registration submissions naming an unknown role are acked by the
//! caller (so the offending node is not left blocked) but never stored,
//! which stalls the barrier and surfaces the configuration mistake
//! instead of letting a half-valid simulation proceed.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use epiwatch_types::{AddressRegistry, NodeAddress, NodeId, Role};

/// The seven strictly-sequential overseer phases, for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverseerPhase {
    /// Accepting registrations until the registry is complete.
    Register,
    /// Publishing the full address registry once.
    BroadcastAddresses,
    /// Accepting `ready_to_start` until every node has reported.
    ReadyBarrier,
    /// Simulation is live; servicing heartbeats and watching for stop.
    Run,
    /// Publishing `stop_simulation`.
    Stop,
    /// Accepting `deregister` until the registry is empty.
    Deregister,
    /// Closing endpoints and handing off logs.
    Shutdown,
}

impl core::fmt::Display for OverseerPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Register => "register",
            Self::BroadcastAddresses => "broadcast_addresses",
            Self::ReadyBarrier => "ready_barrier",
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Deregister => "deregister",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one registration submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Stored in the registry under the submitting node's id.
    Accepted {
        /// The validated role.
        role: Role,
    },
    /// The submitted role tag names none of the three known roles; the
    /// node is acked but excluded, and the barrier will stall.
    UnknownRole {
        /// The tag as submitted.
        submitted: String,
    },
}

/// Barrier and liveness bookkeeping for one simulation run.
#[derive(Debug)]
pub struct OverseerState {
    /// How many nodes the deployment configuration expects.
    expected_nodes: usize,
    /// Valid registrations received so far.
    registry: AddressRegistry,
    /// Nodes that have sent `ready_to_start`.
    ready: BTreeSet<NodeId>,
    /// Last heartbeat instant per node, seeded at run start.
    heartbeats: BTreeMap<NodeId, Instant>,
}

impl OverseerState {
    /// Coordination state for a run expecting `expected_nodes`
    /// registrations.
    pub const fn new(expected_nodes: usize) -> Self {
        Self {
            expected_nodes,
            registry: BTreeMap::new(),
            ready: BTreeSet::new(),
            heartbeats: BTreeMap::new(),
        }
    }

    /// The configured node count every barrier gates on.
    pub const fn expected_nodes(&self) -> usize {
        self.expected_nodes
    }

    /// Validate and store one registration submission.
    ///
    /// A resubmission under an already-registered id replaces the stored
    /// address without changing the registry size.
    pub fn handle_registration(
        &mut self,
        node_id: &NodeId,
        address: NodeAddress,
    ) -> RegistrationOutcome {
        match address.known_role() {
            Some(role) => {
                self.registry.insert(node_id.clone(), address);
                RegistrationOutcome::Accepted { role }
            }
            None => RegistrationOutcome::UnknownRole {
                submitted: address.role,
            },
        }
    }

    /// Whether the registry holds exactly the configured node count.
    pub fn all_registrations_completed(&self) -> bool {
        self.registry.len() == self.expected_nodes
    }

    /// The registry as collected so far.
    pub const fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    /// Record that a node reported ready.
    pub fn record_ready(&mut self, node_id: &NodeId) {
        self.ready.insert(node_id.clone());
    }

    /// Whether every expected node has reported ready.
    pub fn all_ready(&self) -> bool {
        self.ready.len() == self.expected_nodes
    }

    /// Seed the heartbeat table with `now` for every registered node.
    /// Called once when the run phase begins.
    pub fn seed_heartbeats(&mut self, now: Instant) {
        self.heartbeats = self
            .registry
            .keys()
            .map(|node_id| (node_id.clone(), now))
            .collect();
    }

    /// Record a heartbeat from `node_id`. Returns `false` when the id
    /// was never registered (the caller warns and acks a diagnostic).
    pub fn record_heartbeat(&mut self, node_id: &NodeId, now: Instant) -> bool {
        match self.heartbeats.get_mut(node_id) {
            Some(last) => {
                *last = now;
                true
            }
            None => false,
        }
    }

    /// Nodes whose last heartbeat is older than `threshold` at `now`.
    /// Read-only: reporting a miss never evicts the entry.
    pub fn missed_heartbeats(&self, now: Instant, threshold: Duration) -> Vec<NodeId> {
        self.heartbeats
            .iter()
            .filter(|&(_, &last)| now.saturating_duration_since(last) > threshold)
            .map(|(node_id, _)| node_id.clone())
            .collect()
    }

    /// Remove a deregistering node from the registry. Returns `false`
    /// for ids that were not registered.
    pub fn handle_deregistration(&mut self, node_id: &NodeId) -> bool {
        self.registry.remove(node_id).is_some()
    }

    /// Whether every node has deregistered (registry emptied).
    pub fn all_deregistrations_completed(&self) -> bool {
        self.registry.is_empty()
    }
}
