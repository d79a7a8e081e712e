//! The shared node runtime: lifecycle transitions and overseer traffic.
//!
//! Every role drives the same sequence through this type: register with
//! the overseer, receive the one-shot address registry, report ready,
//! wait for `start_simulation`, run its poll loop (multiplexing the
//! overseer broadcast subscription with its peer channels), and on
//! `stop_simulation` deregister and close. Role-specific peer wiring
//! lives with each role's driver; everything the roles share is here.

use std::time::Instant;

use futures::StreamExt as _;
use tracing::{debug, info, warn};

use epiwatch_core::config::NodeConfig;
use epiwatch_core::lifecycle::{Lifecycle, LifecyclePhase};
use epiwatch_types::messages::{BROADCAST_SUBJECT, HEARTBEAT_INTERVAL};
use epiwatch_types::{AddressRegistry, Broadcast, ControlRequest, NodeAddress};

use crate::bus::{self, BusClient};
use crate::error::NodeError;

/// Shared lifecycle state machine and transport wiring for one node.
pub struct NodeRuntime {
    /// The validated node configuration.
    pub(crate) config: NodeConfig,
    /// The bus connection shared by control and peer traffic.
    pub(crate) bus: BusClient,
    /// Subscription to the overseer's broadcast channel.
    pub(crate) broadcast: async_nats::Subscriber,
    /// The strictly-forward lifecycle phase machine.
    lifecycle: Lifecycle,
    /// Wall-clock instant of the last heartbeat sent.
    last_heartbeat: Instant,
}

impl core::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeRuntime")
            .field("node_id", &self.config.node_id)
            .field("phase", &self.lifecycle.phase())
            .finish_non_exhaustive()
    }
}

impl NodeRuntime {
    /// Connect the control and broadcast channels for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] if the connection or the broadcast
    /// subscription fails.
    pub async fn connect(config: NodeConfig) -> Result<Self, NodeError> {
        let bus = BusClient::connect(&config.bus.nats_url).await?;
        let broadcast = bus.subscribe(BROADCAST_SUBJECT.to_owned()).await?;
        Ok(Self {
            config,
            bus,
            broadcast,
            lifecycle: Lifecycle::new(),
            last_heartbeat: Instant::now(),
        })
    }

    /// The current lifecycle phase.
    pub const fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    /// Register this node's address with the overseer and block for the
    /// correlated reply.
    ///
    /// # Errors
    ///
    /// Fails fatally if the reply never names this node
    /// ([`NodeError::Protocol`]); there is deliberately no timeout.
    pub async fn register(&mut self, address: NodeAddress) -> Result<(), NodeError> {
        info!(node_id = %self.config.node_id, role = %self.config.role, "registering with overseer");
        let envelope = bus::envelope(&self.config.node_id, ControlRequest::AddressMap(address));
        let reply = self.bus.request_control(&envelope).await?;
        self.lifecycle.advance_to(LifecyclePhase::Registered)?;
        info!(status = reply.status.as_str(), phase = %self.phase(), "registration acknowledged");
        Ok(())
    }

    /// Block on the broadcast channel for the one-shot full address
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ChannelClosed`] if the subscription ends
    /// first.
    pub async fn receive_node_addresses(&mut self) -> Result<AddressRegistry, NodeError> {
        loop {
            let message = self.broadcast.next().await.ok_or(NodeError::ChannelClosed)?;
            match bus::decode::<Broadcast>(&message.payload) {
                Ok(Broadcast::AddressMap { nodes }) => {
                    self.lifecycle.advance_to(LifecyclePhase::AddressesKnown)?;
                    info!(
                        node_count = nodes.len(),
                        phase = %self.phase(),
                        "address registry received"
                    );
                    return Ok(nodes);
                }
                Ok(other) => {
                    warn!(?other, "unexpected broadcast while awaiting the address registry");
                }
                Err(e) => {
                    warn!(error = %e, "undecodable broadcast dropped");
                }
            }
        }
    }

    /// Send the fixed ready token and block for the ack.
    ///
    /// # Errors
    ///
    /// Propagates bus and lifecycle failures.
    pub async fn send_ready_to_start(&mut self) -> Result<(), NodeError> {
        let envelope = bus::envelope(&self.config.node_id, ControlRequest::ReadyToStart);
        let reply = self.bus.request_control(&envelope).await?;
        self.lifecycle.advance_to(LifecyclePhase::Ready)?;
        info!(status = reply.status.as_str(), phase = %self.phase(), "ready acknowledged");
        Ok(())
    }

    /// Consume broadcasts until the start token arrives, logging
    /// anything else.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ChannelClosed`] if the subscription ends
    /// first.
    pub async fn await_start_simulation(&mut self) -> Result<(), NodeError> {
        loop {
            let message = self.broadcast.next().await.ok_or(NodeError::ChannelClosed)?;
            match bus::decode::<Broadcast>(&message.payload) {
                Ok(Broadcast::StartSimulation) => {
                    self.lifecycle.advance_to(LifecyclePhase::Running)?;
                    self.last_heartbeat = Instant::now();
                    info!(phase = %self.phase(), "simulation started");
                    return Ok(());
                }
                Ok(other) => {
                    warn!(?other, "unexpected broadcast while awaiting simulation start");
                }
                Err(e) => {
                    warn!(error = %e, "undecodable broadcast dropped");
                }
            }
        }
    }

    /// Handle one message (or end-of-stream) from the broadcast channel
    /// during the run phase. Returns `true` once `stop_simulation` has
    /// been observed and the node should leave its poll loop.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ChannelClosed`] if the subscription ended.
    pub fn absorb_broadcast(
        &mut self,
        message: Option<&async_nats::Message>,
    ) -> Result<bool, NodeError> {
        let message = message.ok_or(NodeError::ChannelClosed)?;
        match bus::decode::<Broadcast>(&message.payload) {
            Ok(Broadcast::StopSimulation) => {
                self.lifecycle.advance_to(LifecyclePhase::Stopping)?;
                info!(phase = %self.phase(), "stop observed, leaving the poll loop");
                Ok(true)
            }
            Ok(Broadcast::Heartbeat) => {
                debug!("overseer heartbeat observed");
                Ok(false)
            }
            Ok(other) => {
                warn!(?other, "unexpected broadcast during the run phase, dropping");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "undecodable broadcast dropped");
                Ok(false)
            }
        }
    }

    /// Send a heartbeat and block for its ack if the wall-clock interval
    /// has elapsed. Best-effort liveness: failures are surfaced but the
    /// simulation does not depend on them.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub async fn send_heartbeat_if_due(&mut self) -> Result<(), NodeError> {
        if self.last_heartbeat.elapsed() < HEARTBEAT_INTERVAL {
            return Ok(());
        }
        let envelope = bus::envelope(&self.config.node_id, ControlRequest::Heartbeat);
        let reply = self.bus.request_control(&envelope).await?;
        self.last_heartbeat = Instant::now();
        debug!(status = reply.status.as_str(), "heartbeat acknowledged");
        Ok(())
    }

    /// Send the deregister token and block for the ack.
    ///
    /// # Errors
    ///
    /// Propagates bus and lifecycle failures.
    pub async fn deregister(&mut self) -> Result<(), NodeError> {
        let envelope = bus::envelope(&self.config.node_id, ControlRequest::Deregister);
        let reply = self.bus.request_control(&envelope).await?;
        self.lifecycle.advance_to(LifecyclePhase::Deregistered)?;
        info!(status = reply.status.as_str(), phase = %self.phase(), "deregistered");
        Ok(())
    }

    /// Close all channels. Terminal: the runtime is consumed.
    ///
    /// # Errors
    ///
    /// Propagates bus and lifecycle failures.
    pub async fn close(mut self) -> Result<(), NodeError> {
        self.bus.close().await?;
        self.lifecycle.advance_to(LifecyclePhase::Closed)?;
        info!(node_id = %self.config.node_id, phase = %self.phase(), "node closed");
        Ok(())
    }
}
