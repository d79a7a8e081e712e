//! Node binary for the Epiwatch surveillance simulation.
//!
//! One process, one role. The node walks the shared lifecycle -- register
//! with the overseer, receive the address registry, wire peers, pass the
//! readiness barrier, run its role's poll loop, then deregister and
//! close -- with the role-specific reactive protocol plugged into the
//! middle.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load and validate the node configuration
//! 3. Connect the control and broadcast channels
//! 4. Build and register this node's address
//! 5. Receive the one-shot address registry
//! 6. Hand control to the role driver (peers, barrier, poll loop)
//! 7. Deregister and close

mod bus;
mod error;
mod roles;
mod runtime;

use std::path::PathBuf;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use epiwatch_core::config::NodeConfig;
use epiwatch_types::Role;

use crate::runtime::NodeRuntime;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if initialization or the role's poll loop fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("epiwatch-node starting");

    let config_path = config_path();
    let config = NodeConfig::load(&config_path)
        .with_context(|| format!("loading node config from {}", config_path.display()))?;
    info!(
        node_id = %config.node_id,
        role = %config.role,
        diseases = config.diseases.len(),
        time_scaling_factor = config.time_scaling_factor,
        nats_url = config.bus.nats_url.as_str(),
        "configuration loaded"
    );

    let mut runtime = NodeRuntime::connect(config)
        .await
        .context("connecting to the message bus")?;

    let address = roles::setup_listeners(&runtime.config);
    runtime.register(address).await.context("registering with the overseer")?;

    let registry = runtime
        .receive_node_addresses()
        .await
        .context("receiving the address registry")?;

    match runtime.config.role {
        Role::RecordSource => roles::record_source::run(&mut runtime, &registry).await,
        Role::DistrictAggregator => roles::district_aggregator::run(&mut runtime, &registry).await,
        Role::OutbreakAnalyzer => roles::outbreak_analyzer::run(&mut runtime, &registry).await,
    }
    .context("running the role poll loop")?;

    runtime.deregister().await.context("deregistering")?;
    runtime.close().await.context("closing channels")?;

    info!("epiwatch-node finished");
    Ok(())
}

/// Resolve the configuration file path: first positional argument, then
/// the `EPIWATCH_CONFIG` environment variable, then the conventional
/// file name in the working directory.
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EPIWATCH_CONFIG").ok())
        .map_or_else(|| PathBuf::from("epiwatch-node.yaml"), PathBuf::from)
}
