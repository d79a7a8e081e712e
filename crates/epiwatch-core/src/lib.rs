//! Simulation clock, lifecycle machine, and overseer coordination state
//! for the Epiwatch surveillance simulation.
//!
//! Everything in this crate is transport-free: the node and overseer
//! binaries own the sockets and drive these state machines from their
//! poll loops, so every coordination rule is unit testable without a
//! message bus.
//!
//! # Modules
//!
//! - [`clock`] -- Wall-clock to simulated-time scaling and the
//!   day-rollover rule.
//! - [`config`] -- Typed YAML configuration with per-role parameter
//!   structs validated at construction.
//! - [`lifecycle`] -- The strictly-forward per-node lifecycle phases.
//! - [`overseer`] -- Registration / readiness / deregistration barriers
//!   and the heartbeat table.

pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod overseer;
