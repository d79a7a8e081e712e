//! Poll-loop driver for the outbreak analyzer role.
//!
//! An analyzer subscribes to every connected aggregator's daily-count
//! feed and publishes alerts on its own fan-out subject when the watched
//! disease's total crosses the threshold.

use chrono::Utc;
use futures::StreamExt as _;
use futures::stream::SelectAll;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use epiwatch_core::clock::SimulationClock;
use epiwatch_core::config::RoleParameters;
use epiwatch_roles::OutbreakAnalyzer;
use epiwatch_types::address::DAILY_COUNTS_ENDPOINT;
use epiwatch_types::messages::{POLL_INTERVAL, outbreak_alerts_subject};
use epiwatch_types::{AddressRegistry, FanoutMessage};

use crate::bus;
use crate::error::NodeError;
use crate::runtime::NodeRuntime;

/// Wire the subscriptions, pass the readiness barrier, and run the poll
/// loop until `stop_simulation` arrives.
///
/// # Errors
///
/// Propagates bus, protocol, and lifecycle failures; all of them are
/// fatal to this process.
pub async fn run(runtime: &mut NodeRuntime, registry: &AddressRegistry) -> Result<(), NodeError> {
    let RoleParameters::OutbreakAnalyzer(params) = runtime.config.role_parameters.clone() else {
        return Err(NodeError::Protocol(
            "outbreak analyzer driver started with mismatched role parameters".to_owned(),
        ));
    };

    let alerts_subject = outbreak_alerts_subject(&runtime.config.node_id);

    // connect_to_peers: one daily-count subscription per connected
    // aggregator.
    let mut counts: SelectAll<async_nats::Subscriber> = SelectAll::new();
    for aggregator_id in &runtime.config.connections {
        let subject = registry
            .get(aggregator_id)
            .and_then(|address| address.endpoint(DAILY_COUNTS_ENDPOINT))
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                NodeError::Protocol(format!(
                    "no daily-counts endpoint registered for '{aggregator_id}'"
                ))
            })?;
        info!(aggregator = %aggregator_id, subject = subject.as_str(), "peer resolved");
        counts.push(runtime.bus.subscribe(subject).await?);
    }

    runtime.send_ready_to_start().await?;
    runtime.await_start_simulation().await?;

    let sim = SimulationClock::new(Utc::now(), runtime.config.time_scaling_factor)?;
    let mut role = OutbreakAnalyzer::new(
        runtime.config.node_id.clone(),
        params.disease,
        params.daily_outbreak_threshold,
    );

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = runtime.broadcast.next() => {
                if runtime.absorb_broadcast(message.as_ref())? {
                    break;
                }
            }
            message = counts.next() => {
                let message = message.ok_or(NodeError::ChannelClosed)?;
                match bus::decode::<FanoutMessage>(&message.payload) {
                    Ok(fanout) => {
                        if let Some(alert) = role.handle_fanout(&fanout) {
                            runtime.bus.publish_json(alerts_subject.clone(), &alert).await?;
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable daily count dropped"),
                }
            }
            _ = ticker.tick() => {}
        }

        role.on_tick(&sim, Utc::now());
        runtime.send_heartbeat_if_due().await?;
    }

    // disconnect_from_peers: drop the daily-count subscriptions.
    drop(counts);
    Ok(())
}
