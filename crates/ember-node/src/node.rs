//! Node wiring: storage, overlay, gossip, engine and the HTTP surface

use crate::config::NodeConfig;
use anyhow::Result;
use ember_consensus::{ConsensusEngine, Miner, StaticDelegates, ThreadMiner};
use ember_metrics::Metrics;
use ember_network::{
    unix_millis, DhtConfig, DhtEvent, DhtService, GossipService, Node as Contact, PeerClient,
    PeerClientConfig,
};
use ember_rpc::{ApiConfig, PeerApiServer, PeerDispatch, VersionInfo};
use ember_storage::{NodeStore, StoreConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Semantic version this node advertises
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build identifier baked in at compile time
pub const NODE_BUILD: &str = match option_env!("EMBER_BUILD") {
    Some(build) => build,
    None => "dev",
};

/// A wired Emberchain node: the overlay, its persistence, the gossip
/// publisher and the peer RPC client.
pub struct Node {
    config: NodeConfig,
    metrics: Arc<Metrics>,
    dht: DhtService,
    gossip: GossipService,
    peer_client: PeerClient,
    delegates: Arc<StaticDelegates>,
}

impl Node {
    /// Build a node from a validated configuration. Returns the node and
    /// the overlay event stream for the consensus driver.
    pub async fn new(config: NodeConfig) -> Result<(Self, mpsc::Receiver<DhtEvent>)> {
        config.validate()?;
        let metrics = Arc::new(Metrics::new());

        let store = if config.peers.persistent {
            std::fs::create_dir_all(&config.data_dir)?;
            let store = NodeStore::open(&config.data_dir.join("peers"), StoreConfig::default())?;
            Some(Arc::new(store))
        } else {
            None
        };

        let seeds: Vec<Contact> = config
            .peers
            .list
            .iter()
            .map(|seed| Contact::new(seed.host.clone(), seed.port, 0))
            .collect();
        let local = Contact::new(config.public_ip.clone(), config.peer_port, unix_millis());
        let listen: SocketAddr = format!("0.0.0.0:{}", config.peer_port).parse()?;

        let mut dht_config = DhtConfig::new(local, listen, seeds);
        dht_config.blacklist = config.peers.black_list.clone();
        dht_config.persistent = config.peers.persistent;

        let (dht, dht_events) =
            DhtService::new(dht_config, store, Arc::clone(&metrics)).await?;
        let gossip = GossipService::new(dht.clone());

        let peer_client = PeerClient::new(PeerClientConfig {
            magic: config.magic.clone(),
            version: NODE_VERSION.to_string(),
            timeout: Duration::from_secs(10),
        })?;

        let delegates = Arc::new(StaticDelegates::from_ring(config.delegate_ring()?));

        Ok((
            Self {
                config,
                metrics,
                dht,
                gossip,
                peer_client,
                delegates,
            },
            dht_events,
        ))
    }

    /// Build the consensus engine for this node's parameters
    pub fn build_engine(&self) -> ConsensusEngine {
        let miner: Arc<dyn Miner> = if self.config.miner.workers == 0 {
            Arc::new(ThreadMiner::default())
        } else {
            Arc::new(ThreadMiner::new(self.config.miner.workers))
        };
        ConsensusEngine::new(
            self.config.slot_clock(),
            self.delegates.clone(),
            miner,
            Arc::clone(&self.metrics),
        )
    }

    /// Spawn the HTTP surface one port below the overlay listener
    pub fn spawn_api(&self, dispatch: Arc<dyn PeerDispatch>) {
        let listen_addr: SocketAddr = match format!("0.0.0.0:{}", self.config.peer_port - 1).parse()
        {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, "peer API address invalid");
                return;
            }
        };
        let server = PeerApiServer::new(
            ApiConfig {
                listen_addr,
                ..Default::default()
            },
            self.config.magic.clone(),
            VersionInfo {
                version: NODE_VERSION.to_string(),
                build: NODE_BUILD.to_string(),
                net: self.config.net,
            },
            Arc::new(self.dht.clone()),
            dispatch,
        );
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!("peer API server error: {}", e);
            }
        });
    }

    /// Start the overlay
    pub async fn start(&self) -> Result<()> {
        self.dht.start().await?;
        Ok(())
    }

    /// Stop the overlay loops
    pub fn stop(&self) {
        self.dht.stop();
    }

    /// Metrics registry
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Gossip publisher
    pub fn gossip(&self) -> GossipService {
        self.gossip.clone()
    }

    /// Peer RPC client
    pub fn peer_client(&self) -> PeerClient {
        self.peer_client.clone()
    }

    /// The active delegate ring
    pub fn delegates(&self) -> Arc<StaticDelegates> {
        Arc::clone(&self.delegates)
    }
}
