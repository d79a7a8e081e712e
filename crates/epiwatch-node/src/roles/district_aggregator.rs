//! Poll-loop driver for the district aggregator role.
//!
//! An aggregator serves the request/reply side of the case-reports link,
//! subscribes to every connected analyzer's alert feed, and publishes
//! daily counts on its own fan-out subject. The poll loop multiplexes
//! all of that with the overseer broadcast channel under the bounded
//! poll interval.

use chrono::Utc;
use futures::StreamExt as _;
use futures::stream::SelectAll;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use epiwatch_core::clock::SimulationClock;
use epiwatch_core::config::RoleParameters;
use epiwatch_roles::DistrictAggregator;
use epiwatch_types::address::OUTBREAK_ALERTS_ENDPOINT;
use epiwatch_types::messages::{POLL_INTERVAL, case_reports_subject, daily_counts_subject};
use epiwatch_types::{AddressRegistry, CaseReportRequest, FanoutMessage};

use crate::bus;
use crate::error::NodeError;
use crate::runtime::NodeRuntime;

/// Wire the serving and subscribing channels, pass the readiness
/// barrier, and run the poll loop until `stop_simulation` arrives.
///
/// # Errors
///
/// Propagates bus, protocol, and lifecycle failures; all of them are
/// fatal to this process.
pub async fn run(runtime: &mut NodeRuntime, registry: &AddressRegistry) -> Result<(), NodeError> {
    let RoleParameters::DistrictAggregator(params) = runtime.config.role_parameters.clone() else {
        return Err(NodeError::Protocol(
            "district aggregator driver started with mismatched role parameters".to_owned(),
        ));
    };

    // Serve the endpoints this node registered.
    let mut reports_sub = runtime
        .bus
        .subscribe(case_reports_subject(&runtime.config.node_id))
        .await?;
    let counts_subject = daily_counts_subject(&runtime.config.node_id);

    // connect_to_peers: one alert subscription per connected analyzer.
    let mut alerts: SelectAll<async_nats::Subscriber> = SelectAll::new();
    for analyzer_id in &runtime.config.connections {
        let subject = registry
            .get(analyzer_id)
            .and_then(|address| address.endpoint(OUTBREAK_ALERTS_ENDPOINT))
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                NodeError::Protocol(format!(
                    "no outbreak-alerts endpoint registered for '{analyzer_id}'"
                ))
            })?;
        info!(analyzer = %analyzer_id, subject = subject.as_str(), "peer resolved");
        alerts.push(runtime.bus.subscribe(subject).await?);
    }

    runtime.send_ready_to_start().await?;
    runtime.await_start_simulation().await?;

    let sim = SimulationClock::new(Utc::now(), runtime.config.time_scaling_factor)?;
    let mut role = DistrictAggregator::new(
        runtime.config.node_id.clone(),
        runtime.config.diseases.clone(),
        sim.start(),
        params.daily_count_send_frequency_hours,
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
            message = reports_sub.next() => {
                let message = message.ok_or(NodeError::ChannelClosed)?;
                serve_case_report(runtime, &mut role, &message).await?;
            }
            message = alerts.next(), if !alerts.is_empty() => {
                let message = message.ok_or(NodeError::ChannelClosed)?;
                match bus::decode::<FanoutMessage>(&message.payload) {
                    Ok(fanout) => role.handle_fanout(&fanout),
                    Err(e) => warn!(error = %e, "undecodable alert dropped"),
                }
            }
            _ = ticker.tick() => {}
        }

        let now = Utc::now();
        for report in role.on_tick(&sim, now) {
            runtime.bus.publish_json(counts_subject.clone(), &report).await?;
        }

        runtime.send_heartbeat_if_due().await?;
    }

    // disconnect_from_peers: drop the alert subscriptions and stop
    // serving the case-reports subject.
    drop(alerts);
    drop(reports_sub);
    Ok(())
}

/// Decode one case-report request, let the role state handle it, and
/// send the reply back on the requester's inbox.
async fn serve_case_report(
    runtime: &NodeRuntime,
    role: &mut DistrictAggregator,
    message: &async_nats::Message,
) -> Result<(), NodeError> {
    match bus::decode::<CaseReportRequest>(&message.payload) {
        Ok(request) => {
            let reply = role.handle_case_report(&request);
            match message.reply.clone() {
                Some(reply_subject) => runtime.bus.reply_json(reply_subject, &reply).await,
                None => {
                    warn!("case-report request carried no reply subject, requester will stall");
                    Ok(())
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "undecodable case-report request dropped");
            Ok(())
        }
    }
}
