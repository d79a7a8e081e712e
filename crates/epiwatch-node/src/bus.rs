//! NATS client wrapper for node processes.
//!
//! A node holds one connection and uses it three ways: request/reply to
//! the overseer's control subject, a subscription to the overseer's
//! broadcast subject, and role-specific peer subjects (request/reply for
//! the case-reports link, plain publishes and subscriptions for the
//! fan-out feeds).
//!
//! The client is built with the request timeout disabled. Blocking
//! request/reply with no timeout is the protocol's backpressure
//! mechanism -- at most one outstanding request per link -- and a peer
//! that never replies therefore stalls this process permanently. That
//! gap is a documented design choice, not an accident.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use epiwatch_types::messages::CONTROL_SUBJECT;
use epiwatch_types::{CaseReportReply, CaseReportRequest, ControlEnvelope, ControlReply, NodeId};

use crate::error::NodeError;

/// NATS client wrapper for a node process.
pub struct BusClient {
    client: async_nats::Client,
}

impl BusClient {
    /// Connect to the NATS server with request timeouts disabled.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] if the connection cannot be
    /// established.
    pub async fn connect(url: &str) -> Result<Self, NodeError> {
        info!(url, "connecting to message bus");
        let client = async_nats::ConnectOptions::new()
            .request_timeout(None)
            .connect(url)
            .await
            .map_err(|e| NodeError::Bus(format!("failed to connect to {url}: {e}")))?;
        info!("bus connection established");
        Ok(Self { client })
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] if the subscription fails.
    pub async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber, NodeError> {
        debug!(subject, "subscribing");
        self.client
            .subscribe(subject.clone())
            .await
            .map_err(|e| NodeError::Bus(format!("failed to subscribe to {subject}: {e}")))
    }

    /// Send one control request and block for the overseer's reply.
    ///
    /// The reply must be addressed to `node_id`; the control channel is
    /// multiplexed, so a reply naming anyone else means the protocol
    /// broke and this node cannot continue.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] on transport failure and
    /// [`NodeError::Protocol`] on a misaddressed reply.
    pub async fn request_control(
        &self,
        envelope: &ControlEnvelope,
    ) -> Result<ControlReply, NodeError> {
        let reply: ControlReply = self
            .request_json(CONTROL_SUBJECT.to_owned(), envelope)
            .await?;
        if reply.node_id == envelope.node_id {
            Ok(reply)
        } else {
            Err(NodeError::Protocol(format!(
                "control reply addressed to '{}' arrived at '{}'",
                reply.node_id, envelope.node_id
            )))
        }
    }

    /// Send one case-report request to an aggregator's subject and block
    /// for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] on transport failure and
    /// [`NodeError::Serde`] on an undecodable reply.
    pub async fn request_case_report(
        &self,
        subject: String,
        request: &CaseReportRequest,
    ) -> Result<CaseReportReply, NodeError> {
        self.request_json(subject, request).await
    }

    /// Publish one JSON-encoded message, fire and forget.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] if serialization or publishing fails.
    pub async fn publish_json<T: Serialize>(
        &self,
        subject: String,
        value: &T,
    ) -> Result<(), NodeError> {
        let payload = serde_json::to_vec(value)?;
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| NodeError::Bus(format!("failed to publish to {subject}: {e}")))
    }

    /// Reply to a received request message.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] if serialization or publishing fails.
    pub async fn reply_json<T: Serialize>(
        &self,
        reply_subject: async_nats::Subject,
        value: &T,
    ) -> Result<(), NodeError> {
        let payload = serde_json::to_vec(value)?;
        self.client
            .publish(reply_subject, payload.into())
            .await
            .map_err(|e| NodeError::Bus(format!("failed to publish reply: {e}")))
    }

    /// Flush buffered messages and drain the connection.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bus`] if the drain fails.
    pub async fn close(&self) -> Result<(), NodeError> {
        self.client
            .drain()
            .await
            .map_err(|e| NodeError::Bus(format!("failed to drain connection: {e}")))
    }

    async fn request_json<T: Serialize, R: DeserializeOwned>(
        &self,
        subject: String,
        value: &T,
    ) -> Result<R, NodeError> {
        let payload = serde_json::to_vec(value)?;
        let message = self
            .client
            .request(subject.clone(), payload.into())
            .await
            .map_err(|e| NodeError::Bus(format!("request on {subject} failed: {e}")))?;
        Ok(serde_json::from_slice(&message.payload)?)
    }
}

impl core::fmt::Debug for BusClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusClient").finish_non_exhaustive()
    }
}

/// Decode a received payload, mapping failure to the warn-and-drop
/// contract: the caller logs the error and skips the message.
pub fn decode<R: DeserializeOwned>(payload: &[u8]) -> Result<R, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Convenience for building the control envelope this node tags every
/// request with.
pub fn envelope(
    node_id: &NodeId,
    request: epiwatch_types::ControlRequest,
) -> ControlEnvelope {
    ControlEnvelope {
        node_id: node_id.clone(),
        request,
    }
}
