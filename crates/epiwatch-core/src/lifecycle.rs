//! The per-node lifecycle state machine.
//!
//! Every role walks the same strictly-forward sequence:
//!
//! ```text
//! CREATED -> REGISTERED -> ADDRESSES_KNOWN -> READY -> RUNNING
//!         -> STOPPING -> DEREGISTERED -> CLOSED
//! ```
//!
//! There is no re-entry and no branching; skipping a phase is a protocol
//! bug, so [`Lifecycle::advance_to`] rejects anything but the immediate
//! successor.

/// The phases a node moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecyclePhase {
    /// Constructed, nothing sent yet.
    Created,
    /// Registration acked by the overseer.
    Registered,
    /// The full address registry has been received.
    AddressesKnown,
    /// Peers wired; readiness acked by the overseer.
    Ready,
    /// `start_simulation` observed; the poll loop is live.
    Running,
    /// `stop_simulation` observed; leaving the poll loop.
    Stopping,
    /// Deregistration acked by the overseer.
    Deregistered,
    /// All channels closed. Terminal.
    Closed,
}

impl LifecyclePhase {
    /// The phase that legally follows this one, or `None` for the
    /// terminal phase.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::Registered),
            Self::Registered => Some(Self::AddressesKnown),
            Self::AddressesKnown => Some(Self::Ready),
            Self::Ready => Some(Self::Running),
            Self::Running => Some(Self::Stopping),
            Self::Stopping => Some(Self::Deregistered),
            Self::Deregistered => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Human-readable phase name for log lines.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Registered => "REGISTERED",
            Self::AddressesKnown => "ADDRESSES_KNOWN",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Deregistered => "DEREGISTERED",
            Self::Closed => "CLOSED",
        }
    }
}

impl core::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors raised by illegal phase transitions.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Attempted to move to a phase that is not the immediate successor.
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        /// The phase the node was in.
        from: LifecyclePhase,
        /// The phase the caller asked for.
        to: LifecyclePhase,
    },
}

/// Tracks a node's current phase and enforces forward-only movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    phase: LifecyclePhase,
}

impl Lifecycle {
    /// A fresh lifecycle in [`LifecyclePhase::Created`].
    pub const fn new() -> Self {
        Self {
            phase: LifecyclePhase::Created,
        }
    }

    /// The current phase.
    pub const fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Move to `target`, which must be the immediate successor of the
    /// current phase.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] otherwise.
    pub fn advance_to(&mut self, target: LifecyclePhase) -> Result<(), LifecycleError> {
        if self.phase.next() == Some(target) {
            self.phase = target;
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.phase,
                to: target,
            })
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn full_forward_walk_succeeds() {
        let mut lifecycle = Lifecycle::new();
        for target in [
            LifecyclePhase::Registered,
            LifecyclePhase::AddressesKnown,
            LifecyclePhase::Ready,
            LifecyclePhase::Running,
            LifecyclePhase::Stopping,
            LifecyclePhase::Deregistered,
            LifecyclePhase::Closed,
        ] {
            lifecycle.advance_to(target).unwrap();
            assert_eq!(lifecycle.phase(), target);
        }
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        let result = lifecycle.advance_to(LifecyclePhase::Running);
        assert!(result.is_err());
        assert_eq!(lifecycle.phase(), LifecyclePhase::Created);
    }

    #[test]
    fn moving_backward_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.advance_to(LifecyclePhase::Registered).unwrap();
        assert!(lifecycle.advance_to(LifecyclePhase::Created).is_err());
    }

    #[test]
    fn closed_is_terminal() {
        assert_eq!(LifecyclePhase::Closed.next(), None);
    }
}
