//! Error types for the node binary.
//!
//! Uses `thiserror` for typed errors that surface through the whole node
//! lifecycle: bus connectivity, the coordination protocol, and the
//! strictly-forward lifecycle machine.

/// Errors that can occur while running a node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The simulation clock rejected its parameters.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: epiwatch_core::clock::ClockError,
    },

    /// An illegal lifecycle transition was attempted.
    #[error("lifecycle error: {source}")]
    Lifecycle {
        /// The underlying lifecycle error.
        #[from]
        source: epiwatch_core::lifecycle::LifecycleError,
    },

    /// Failed to connect to or communicate with the message bus.
    #[error("bus error: {0}")]
    Bus(String),

    /// The coordination protocol was violated in a way this node cannot
    /// recover from (e.g. a control reply addressed to someone else).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A subscription ended while the node still needed it.
    #[error("bus channel closed unexpectedly")]
    ChannelClosed,

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
