//! The overseer's two endpoints: the control reply channel and the
//! broadcast channel.
//!
//! The control endpoint serves request/reply transactions keyed by the
//! requester id carried in every envelope; the broadcast endpoint fans
//! out to all subscribed nodes with no filtering. Both ride one NATS
//! connection.

use futures::StreamExt as _;
use tracing::{debug, info, warn};

use epiwatch_types::messages::{BROADCAST_SUBJECT, CONTROL_SUBJECT};
use epiwatch_types::{Broadcast, ControlEnvelope, ControlReply, NodeId};

use crate::error::OverseerError;

/// The overseer's bound endpoints.
pub struct ControlEndpoint {
    client: async_nats::Client,
    requests: async_nats::Subscriber,
}

impl ControlEndpoint {
    /// Connect to the bus and bind the control subject.
    ///
    /// # Errors
    ///
    /// Returns [`OverseerError::Bus`] if the connection or subscription
    /// fails.
    pub async fn bind(url: &str) -> Result<Self, OverseerError> {
        info!(url, "connecting to message bus");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| OverseerError::Bus(format!("failed to connect to {url}: {e}")))?;
        let requests = client
            .subscribe(CONTROL_SUBJECT)
            .await
            .map_err(|e| OverseerError::Bus(format!("failed to bind control subject: {e}")))?;
        info!(
            control = CONTROL_SUBJECT,
            broadcast = BROADCAST_SUBJECT,
            "endpoints bound"
        );
        Ok(Self { client, requests })
    }

    /// Block for the next decodable control request.
    ///
    /// Undecodable payloads are logged and dropped: without an envelope
    /// there is no requester to ack, so the sender is left to its
    /// documented no-timeout stall.
    ///
    /// # Errors
    ///
    /// Returns [`OverseerError::ChannelClosed`] if the subscription
    /// ends.
    pub async fn next_request(
        &mut self,
    ) -> Result<(ControlEnvelope, Option<async_nats::Subject>), OverseerError> {
        loop {
            let message = self.requests.next().await.ok_or(OverseerError::ChannelClosed)?;
            match serde_json::from_slice::<ControlEnvelope>(&message.payload) {
                Ok(envelope) => {
                    debug!(node_id = %envelope.node_id, request = ?envelope.request, "control request");
                    return Ok((envelope, message.reply));
                }
                Err(e) => {
                    warn!(error = %e, "undecodable control request dropped");
                }
            }
        }
    }

    /// Ack a control request back to its requester.
    ///
    /// # Errors
    ///
    /// Returns [`OverseerError::Bus`] if the publish fails.
    pub async fn ack(
        &self,
        reply: Option<async_nats::Subject>,
        node_id: &NodeId,
        status: impl Into<String>,
    ) -> Result<(), OverseerError> {
        let Some(reply_subject) = reply else {
            warn!(%node_id, "control request carried no reply subject, requester will stall");
            return Ok(());
        };
        let payload = serde_json::to_vec(&ControlReply {
            node_id: node_id.clone(),
            status: status.into(),
        })?;
        self.client
            .publish(reply_subject, payload.into())
            .await
            .map_err(|e| OverseerError::Bus(format!("failed to ack '{node_id}': {e}")))
    }

    /// Publish one message on the broadcast channel.
    ///
    /// # Errors
    ///
    /// Returns [`OverseerError::Bus`] if the publish fails.
    pub async fn broadcast(&self, message: &Broadcast) -> Result<(), OverseerError> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(BROADCAST_SUBJECT, payload.into())
            .await
            .map_err(|e| OverseerError::Bus(format!("broadcast failed: {e}")))
    }

    /// Flush buffered messages and drain the connection.
    ///
    /// # Errors
    ///
    /// Returns [`OverseerError::Bus`] if the drain fails.
    pub async fn close(&self) -> Result<(), OverseerError> {
        self.client
            .drain()
            .await
            .map_err(|e| OverseerError::Bus(format!("failed to drain connection: {e}")))
    }
}

impl core::fmt::Debug for ControlEndpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlEndpoint").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Endpoint tests need a live NATS server and are skipped during
    // normal runs.
    #[tokio::test]
    #[ignore]
    async fn bind_endpoints() {
        let result = ControlEndpoint::bind("nats://localhost:4222").await;
        assert!(result.is_ok());
    }
}
