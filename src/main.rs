//! Process entry point for `tube-status`.
//!
//! Everything in this file is "external collaborator" territory per the
//! core's own scope (§1): CLI parsing, config-file/env layering, tracing
//! installation, and wiring the seven components into one running node.
//! None of it is part of the ~3k-line core; it exists so the workspace is
//! runnable end to end (§6.2, §10.3).

mod config;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tube_core::{EventListeners, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "tube-status", about = "Resilient tube line status cache")]
struct Cli {
    /// Path to a TOML config file (optional; env vars and defaults still apply).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `nodeId`. Required if not set by config file or `TUBE_NODE_ID`.
    #[arg(long, env = "TUBE_NODE_ID")]
    node_id: Option<String>,

    /// Overrides `upstreamBaseUrl`. Required if not set elsewhere.
    #[arg(long, env = "TUBE_UPSTREAM_BASE_URL")]
    upstream_base_url: Option<String>,
}

impl Cli {
    fn into_partial(self) -> config::PartialNodeConfig {
        config::PartialNodeConfig {
            node_id: self.node_id,
            upstream_base_url: self.upstream_base_url,
            ..Default::default()
        }
    }
}

fn install_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    install_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let node_config = config::load(config_path.as_deref(), cli.into_partial())?;

    tracing::info!(node_id = %node_config.node_id, "starting tube-status node");

    let clock: Arc<dyn tube_core::Clock> = Arc::new(SystemClock);

    let gateway_config = tube_gateway::GatewayConfig::builder(
        node_config.node_id.clone(),
        node_config.upstream_base_url.clone(),
    )
    .breaker_failure_threshold(node_config.breaker_failure_threshold)
    .breaker_open_duration(node_config.breaker_open_duration)
    .retry_max_attempts(node_config.retry_max_attempts)
    .retry_base_delay(node_config.retry_base_delay)
    .retry_max_delay(node_config.retry_max_delay)
    .retry_jitter(node_config.retry_jitter)
    .clock(Arc::clone(&clock))
    .build();
    let (gateway, _gateway_task) =
        tube_gateway::spawn(gateway_config, EventListeners::new());

    // Concrete peer gossip transport is an external collaborator (§9, "cluster
    // membership via framework gossip"): this process wiring layer doesn't
    // implement one, so a single node simply gossips to nobody. A deployment
    // that wants real cross-node replication supplies its own
    // `tube_register::PeerTransport` impl here instead of `NoopTransport`.
    let register_config = tube_register::RegisterConfig::builder(node_config.node_id.clone())
        .write_majority_timeout(node_config.write_majority_timeout)
        .build();
    let (register, _register_task) = tube_register::spawn(
        register_config,
        Arc::new(tube_register::NoopTransport),
        EventListeners::new(),
        Arc::clone(&clock),
    );

    let coordinator_config = tube_coordinator::CoordinatorConfig::builder(node_config.node_id.clone())
        .refresh_interval(node_config.refresh_interval)
        .refresh_jitter(node_config.refresh_jitter)
        .recent_enough_threshold(node_config.recent_enough_threshold)
        .background_refresh_threshold(node_config.background_refresh_threshold)
        .ask_timeout(node_config.ask_timeout)
        .drain_timeout(node_config.drain_timeout)
        .build();
    let (coordinator, _coordinator_task) = tube_coordinator::spawn(
        coordinator_config,
        gateway.clone(),
        register,
        EventListeners::new(),
        Arc::clone(&clock),
    );

    // Kept so the process boundary can send `Shutdown` to both actors once
    // the signal arrives; `read_api` gets its own clones (§9 "RAII /
    // shutdown hooks": an explicit shutdown message per long-running
    // component, awaited with a timeout at the process boundary).
    let coordinator_for_shutdown = coordinator.clone();
    let gateway_for_shutdown = gateway.clone();

    let read_api_config = tube_readapi::ReadApiConfig::builder()
        .min_ask_max_age_ms(node_config.min_ask_max_age_ms)
        .build();
    let read_api = tube_readapi::ReadApi::new(coordinator, gateway, read_api_config, clock);

    // Warm the cache once at startup rather than waiting for the first
    // request or the first periodic tick (the source documentation's "cold
    // cluster start" path still applies if this fails; we just log it).
    match read_api.get_all_status(None).await {
        Ok(reply) => tracing::info!(
            lines = reply.snapshot.lines.len(),
            stale = reply.meta.stale,
            "initial cache warm succeeded"
        ),
        Err(err) => tracing::warn!(error = %err, "initial cache warm failed; will retry on refresh tick"),
    }

    tracing::info!("tube-status node ready; awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    shutdown_components(coordinator_for_shutdown, gateway_for_shutdown).await;
    Ok(())
}

/// Sends `Shutdown` to the coordinator and gateway and awaits both acks,
/// bounded by a fixed grace period so a stuck actor can't hang the process
/// on exit (§9).
async fn shutdown_components(
    coordinator: tube_coordinator::CoordinatorHandle,
    gateway: tube_gateway::GatewayHandle,
) {
    const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

    let acks = async {
        tokio::join!(coordinator.shutdown(), gateway.shutdown())
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, acks).await.is_err() {
        tracing::warn!("shutdown grace period elapsed before all components acknowledged");
    } else {
        tracing::info!("all components acknowledged shutdown");
    }
}
