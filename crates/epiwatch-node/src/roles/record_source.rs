//! Poll-loop driver for the record source role.
//!
//! A record source has no listeners: it resolves its single aggregator's
//! case-reports subject from the registry and dials out. Both request
//! kinds on that link block for their reply with no timeout -- the
//! at-most-one-outstanding-request contract -- so a dead aggregator
//! stalls this process by design.

use chrono::Utc;
use futures::StreamExt as _;
use tokio::time::MissedTickBehavior;
use tracing::info;

use epiwatch_core::clock::SimulationClock;
use epiwatch_core::config::RoleParameters;
use epiwatch_roles::RecordSource;
use epiwatch_types::address::CASE_REPORTS_ENDPOINT;
use epiwatch_types::messages::POLL_INTERVAL;
use epiwatch_types::AddressRegistry;

use crate::error::NodeError;
use crate::runtime::NodeRuntime;

/// Wire the peer link, pass the readiness barrier, and run the poll
/// loop until `stop_simulation` arrives.
///
/// # Errors
///
/// Propagates bus, protocol, and lifecycle failures; all of them are
/// fatal to this process.
pub async fn run(runtime: &mut NodeRuntime, registry: &AddressRegistry) -> Result<(), NodeError> {
    let RoleParameters::RecordSource(params) = runtime.config.role_parameters.clone() else {
        return Err(NodeError::Protocol(
            "record source driver started with mismatched role parameters".to_owned(),
        ));
    };

    // connect_to_peers: resolve the one aggregator this source reports to.
    let aggregator_id = runtime
        .config
        .connections
        .first()
        .cloned()
        .ok_or_else(|| NodeError::Protocol("record source has no aggregator connection".to_owned()))?;
    let report_subject = registry
        .get(&aggregator_id)
        .and_then(|address| address.endpoint(CASE_REPORTS_ENDPOINT))
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            NodeError::Protocol(format!(
                "no case-reports endpoint registered for '{aggregator_id}'"
            ))
        })?;
    info!(aggregator = %aggregator_id, subject = report_subject.as_str(), "peer resolved");

    runtime.send_ready_to_start().await?;
    runtime.await_start_simulation().await?;

    let sim = SimulationClock::new(Utc::now(), runtime.config.time_scaling_factor)?;
    let mut role = RecordSource::new(
        runtime.config.node_id.clone(),
        runtime.config.diseases.clone(),
        params.disease_generation,
        sim.start(),
        params.outbreak_query_frequency_hours,
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
            _ = ticker.tick() => {}
        }

        let now = Utc::now();
        role.on_tick(&sim, now);

        // The rng must not be held across an await; draw first, send after.
        let occurred = {
            let mut rng = rand::rng();
            role.draw_occurrences(now, &mut rng)
        };
        for disease in occurred {
            let request = role.build_notification(&disease, sim.simulated_now(now));
            let reply = runtime
                .bus
                .request_case_report(report_subject.clone(), &request)
                .await?;
            role.absorb_reply(&reply);
        }

        if role.query_due(sim.simulated_now(now)) {
            let request = role.build_outbreak_query(sim.simulated_now(now));
            let reply = runtime
                .bus
                .request_case_report(report_subject.clone(), &request)
                .await?;
            for disease in role.absorb_reply(&reply) {
                info!(disease = disease.as_str(), "new outbreak learned from district");
            }
        }

        runtime.send_heartbeat_if_due().await?;
    }

    // disconnect_from_peers: nothing held open -- the source only dialed out.
    Ok(())
}
