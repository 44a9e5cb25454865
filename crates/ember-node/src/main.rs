//! Emberchain node binary
//!
//! This is the main entry point for running an Emberchain consensus node.

mod cli;
mod config;
mod driver;
mod node;

use anyhow::Result;
use cli::Cli;
use config::{NodeConfig, SeedConfig};
use driver::{CandidateFeed, ChainEvent, ConsensusDriver, DriverDispatch};
use node::Node;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!(version = node::NODE_VERSION, "Emberchain node starting...");

    // Invalid configuration is fatal at startup, nowhere else
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let (node, dht_events) = Node::new(config.clone()).await?;
    let engine = node.build_engine();
    let keypairs = config.forging_keypairs()?;
    if keypairs.is_empty() {
        tracing::info!("no forging secrets configured; verifying and voting relay only");
    } else {
        tracing::info!(keys = keypairs.len(), "forging enabled");
    }

    // The external block module pushes candidates through this feed
    let feed = CandidateFeed::new();

    let (consensus_driver, registry, mut chain_events) = ConsensusDriver::new(
        engine,
        node.delegates(),
        node.gossip(),
        dht_events,
        node.peer_client(),
        keypairs,
        Arc::new(feed.clone()),
        node.metrics(),
        &config,
    );

    node.spawn_api(Arc::new(DriverDispatch::new(registry)));
    node.start().await?;
    tracing::info!(
        "overlay on udp/{} and peer API on tcp/{}",
        config.peer_port,
        config.peer_port - 1
    );

    // Committed blocks and address changes go to the block module; until
    // one is attached they are surfaced in the log.
    let metrics = node.metrics();
    tokio::spawn(async move {
        while let Some(event) = chain_events.recv().await {
            match event {
                ChainEvent::Committed { height, id, votes } => {
                    tracing::info!(
                        height,
                        %id,
                        signatures = votes.signatures.len(),
                        "block committed"
                    );
                }
                ChainEvent::PublicIpChanged { ip, port, .. } => {
                    tracing::info!(%ip, port, "public address changed");
                }
            }
            metrics.incr("node.chain_events");
        }
    });

    // Shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    consensus_driver.run(shutdown_rx).await;
    node.stop();

    tracing::info!("Emberchain node stopped");
    Ok(())
}

/// CLI flags win over the config file
fn apply_overrides(config: &mut NodeConfig, cli: &Cli) {
    if let Some(datadir) = &cli.datadir {
        config.data_dir = datadir.clone();
    }
    if let Some(peer_port) = cli.peer_port {
        config.peer_port = peer_port;
    }
    if let Some(public_ip) = &cli.public_ip {
        config.public_ip = public_ip.clone();
    }
    if !cli.seeds.is_empty() {
        config.peers.list = cli
            .seeds
            .split(',')
            .filter_map(|seed| {
                let (host, port) = seed.trim().rsplit_once(':')?;
                Some(SeedConfig {
                    host: host.to_string(),
                    port: port.parse().ok()?,
                })
            })
            .collect();
    }
}
