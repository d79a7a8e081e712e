//! Overseer binary for the Epiwatch surveillance simulation.
//!
//! The overseer walks seven strictly-sequential phases, each gated by a
//! counted barrier or a single broadcast:
//!
//! 1. Register -- collect one valid address map per configured node
//! 2. Broadcast addresses -- publish the full registry once
//! 3. Ready barrier -- collect `ready_to_start` from every node
//! 4. Run -- service heartbeats, watch for misses, await a stop
//! 5. Stop -- publish `stop_simulation`
//! 6. Deregister barrier -- empty the registry entry by entry
//! 7. Shutdown -- close endpoints, hand the log file to the post-run
//!    command if one is configured

mod control;
mod error;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use epiwatch_core::config::OverseerConfig;
use epiwatch_core::overseer::{OverseerPhase, OverseerState, RegistrationOutcome};
use epiwatch_types::messages::{
    ACK_SUCCESS, HEARTBEAT_INTERVAL, HEARTBEAT_MISS_THRESHOLD, POLL_INTERVAL,
};
use epiwatch_types::{Broadcast, ControlRequest};

use crate::control::ControlEndpoint;
use crate::error::OverseerError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if initialization or any phase fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("epiwatch-overseer starting");

    let config_path = config_path();
    let config = OverseerConfig::load(&config_path)
        .with_context(|| format!("loading overseer config from {}", config_path.display()))?;
    info!(
        expected_nodes = config.nodes.len(),
        nats_url = config.bus.nats_url.as_str(),
        "configuration loaded"
    );

    let mut endpoint = ControlEndpoint::bind(&config.bus.nats_url)
        .await
        .context("binding the overseer endpoints")?;
    let mut state = OverseerState::new(config.nodes.len());

    registration_phase(&mut endpoint, &mut state)
        .await
        .context("registration phase")?;

    info!(phase = %OverseerPhase::BroadcastAddresses, "publishing the address registry");
    endpoint
        .broadcast(&Broadcast::AddressMap {
            nodes: state.registry().clone(),
        })
        .await
        .context("broadcasting addresses")?;

    ready_phase(&mut endpoint, &mut state)
        .await
        .context("ready barrier phase")?;

    run_phase(&mut endpoint, &mut state)
        .await
        .context("run phase")?;

    info!(phase = %OverseerPhase::Stop, "publishing stop");
    endpoint
        .broadcast(&Broadcast::StopSimulation)
        .await
        .context("broadcasting stop")?;

    deregistration_phase(&mut endpoint, &mut state)
        .await
        .context("deregistration phase")?;

    info!(phase = %OverseerPhase::Shutdown, "closing endpoints");
    endpoint.close().await.context("closing endpoints")?;
    post_log(&config).await;

    info!("epiwatch-overseer finished");
    Ok(())
}

/// Phase 1: accept registrations until the registry holds every
/// configured node.
async fn registration_phase(
    endpoint: &mut ControlEndpoint,
    state: &mut OverseerState,
) -> Result<(), OverseerError> {
    info!(
        phase = %OverseerPhase::Register,
        expected = state.expected_nodes(),
        "awaiting registrations"
    );
    while !state.all_registrations_completed() {
        let (envelope, reply) = endpoint.next_request().await?;
        match envelope.request {
            ControlRequest::AddressMap(address) => {
                match state.handle_registration(&envelope.node_id, address) {
                    RegistrationOutcome::Accepted { role } => {
                        info!(
                            node_id = %envelope.node_id,
                            %role,
                            registered = state.registry().len(),
                            expected = state.expected_nodes(),
                            "node registered"
                        );
                        endpoint.ack(reply, &envelope.node_id, ACK_SUCCESS).await?;
                    }
                    RegistrationOutcome::UnknownRole { submitted } => {
                        // Acked so the node is not left blocked, but
                        // excluded: the stalled barrier surfaces the
                        // configuration mistake.
                        error!(
                            node_id = %envelope.node_id,
                            role = submitted.as_str(),
                            "unknown role submitted, node excluded from registry"
                        );
                        endpoint
                            .ack(
                                reply,
                                &envelope.node_id,
                                format!("unknown role '{submitted}', not registered"),
                            )
                            .await?;
                    }
                }
            }
            other => {
                warn!(node_id = %envelope.node_id, request = ?other, "expected an address map");
                endpoint
                    .ack(reply, &envelope.node_id, "expected an address_map registration")
                    .await?;
            }
        }
    }
    info!(phase = %OverseerPhase::Register, "all registrations completed");
    Ok(())
}

/// Phase 3: accept `ready_to_start` until every node has reported.
async fn ready_phase(
    endpoint: &mut ControlEndpoint,
    state: &mut OverseerState,
) -> Result<(), OverseerError> {
    info!(phase = %OverseerPhase::ReadyBarrier, "awaiting readiness");
    while !state.all_ready() {
        let (envelope, reply) = endpoint.next_request().await?;
        match envelope.request {
            ControlRequest::ReadyToStart => {
                state.record_ready(&envelope.node_id);
                info!(node_id = %envelope.node_id, "node ready");
                endpoint.ack(reply, &envelope.node_id, ACK_SUCCESS).await?;
            }
            other => {
                // Forgiving: the sender is acked with a diagnostic so it
                // is never left blocked on a malformed exchange.
                warn!(node_id = %envelope.node_id, request = ?other, "expected ready_to_start");
                endpoint
                    .ack(reply, &envelope.node_id, "expected ready_to_start")
                    .await?;
            }
        }
    }
    info!(phase = %OverseerPhase::ReadyBarrier, "all nodes ready");
    Ok(())
}

/// Phase 4: seed the heartbeat table, publish `start_simulation`, then
/// service heartbeats until a remote stop or a local interrupt.
async fn run_phase(
    endpoint: &mut ControlEndpoint,
    state: &mut OverseerState,
) -> Result<(), OverseerError> {
    state.seed_heartbeats(Instant::now());
    endpoint.broadcast(&Broadcast::StartSimulation).await?;
    info!(phase = %OverseerPhase::Run, "simulation started");

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_beat = Instant::now();

    loop {
        tokio::select! {
            request = endpoint.next_request() => {
                let (envelope, reply) = request?;
                match envelope.request {
                    ControlRequest::Heartbeat => {
                        if state.record_heartbeat(&envelope.node_id, Instant::now()) {
                            endpoint.ack(reply, &envelope.node_id, ACK_SUCCESS).await?;
                        } else {
                            warn!(node_id = %envelope.node_id, "heartbeat from unregistered node");
                            endpoint
                                .ack(reply, &envelope.node_id, "unregistered node")
                                .await?;
                        }
                    }
                    ControlRequest::StopSimulation => {
                        // Operator-initiated remote shutdown.
                        info!(node_id = %envelope.node_id, "remote stop received");
                        endpoint.ack(reply, &envelope.node_id, ACK_SUCCESS).await?;
                        break;
                    }
                    other => {
                        warn!(node_id = %envelope.node_id, request = ?other, "unexpected request during run");
                        endpoint
                            .ack(reply, &envelope.node_id, "unexpected request during run")
                            .await?;
                    }
                }
            }
            _ = poll.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping the simulation");
                break;
            }
        }

        // Liveness scan: a miss is an alert, never a fatality.
        let now = Instant::now();
        for node_id in state.missed_heartbeats(now, HEARTBEAT_MISS_THRESHOLD) {
            error!(%node_id, "heartbeat missed");
        }

        // Republish the overseer's own liveness signal.
        if last_beat.elapsed() >= HEARTBEAT_INTERVAL {
            endpoint.broadcast(&Broadcast::Heartbeat).await?;
            last_beat = Instant::now();
        }
    }
    Ok(())
}

/// Phase 6: accept `deregister` until the registry has emptied.
async fn deregistration_phase(
    endpoint: &mut ControlEndpoint,
    state: &mut OverseerState,
) -> Result<(), OverseerError> {
    info!(phase = %OverseerPhase::Deregister, "awaiting deregistrations");
    while !state.all_deregistrations_completed() {
        let (envelope, reply) = endpoint.next_request().await?;
        match envelope.request {
            ControlRequest::Deregister => {
                if state.handle_deregistration(&envelope.node_id) {
                    info!(
                        node_id = %envelope.node_id,
                        remaining = state.registry().len(),
                        "node deregistered"
                    );
                    endpoint.ack(reply, &envelope.node_id, ACK_SUCCESS).await?;
                } else {
                    warn!(node_id = %envelope.node_id, "deregister from unregistered node");
                    endpoint
                        .ack(reply, &envelope.node_id, "unregistered node")
                        .await?;
                }
            }
            other => {
                warn!(node_id = %envelope.node_id, request = ?other, "expected deregister");
                endpoint
                    .ack(reply, &envelope.node_id, "expected deregister")
                    .await?;
            }
        }
    }
    info!(phase = %OverseerPhase::Deregister, "registry empty");
    Ok(())
}

/// Hand the log file to the configured post-run command, if any.
///
/// The command stands in for the deployment's log-upload collaborator
/// and is invoked with the log file path as its single argument.
/// Failures are logged, never fatal: the run itself already finished.
async fn post_log(config: &OverseerConfig) {
    let Some(command) = config.post_log_command.as_deref() else {
        return;
    };
    let Some(log_file) = config.log_file.as_deref() else {
        warn!(command, "post_log_command configured without a log_file, skipping");
        return;
    };

    info!(command, log_file = %log_file.display(), "handing off log file");
    match tokio::process::Command::new(command)
        .arg(log_file)
        .status()
        .await
    {
        Ok(status) if status.success() => info!("log handoff completed"),
        Ok(status) => warn!(%status, "log handoff command reported failure"),
        Err(e) => warn!(error = %e, "log handoff command could not be run"),
    }
}

/// Resolve the configuration file path: first positional argument, then
/// the `EPIWATCH_CONFIG` environment variable, then the conventional
/// file name in the working directory.
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EPIWATCH_CONFIG").ok())
        .map_or_else(|| PathBuf::from("epiwatch-overseer.yaml"), PathBuf::from)
}
