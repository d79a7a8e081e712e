//! Error types for the overseer binary.

/// Errors that can occur while coordinating a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum OverseerError {
    /// Failed to connect to or communicate with the message bus.
    #[error("bus error: {0}")]
    Bus(String),

    /// The control subscription ended while a phase still needed it.
    #[error("control channel closed unexpectedly")]
    ChannelClosed,

    /// Serialization failure on an outgoing message.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
