//! ConsensusDriver - glues the overlay, gossip layer and consensus engine
//!
//! One round, from this node's perspective:
//! 1. Slot tick: if the slot's elected delegate is ours, pull a candidate
//!    from the block source, mine and publish a proposal
//! 2. `propose` topic: verify PoW + signature, install the pending block,
//!    answer with our own votes
//! 3. `votes` topic: aggregate signatures; past the two-thirds threshold
//!    the block is handed to the external block consumer and the round
//!    resets
//!
//! All `PendingState` mutation is confined to this task.

use crate::config::NodeConfig;
use async_trait::async_trait;
use ember_consensus::{ConsensusEngine, DelegateRegistry};
use ember_crypto::KeyPair;
use ember_metrics::Metrics;
use ember_network::{
    topic, unix_millis, DhtEvent, GossipMessage, GossipService, Node as Contact, PeerClient,
    TopicRegistry,
};
use ember_rpc::PeerDispatch;
use ember_types::{BlockHeader, EnvContext, Propose, Vote};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Events handed to the external block module
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A pending block crossed the vote threshold
    Committed {
        /// Height of the committed block
        height: u64,
        /// Identifier of the committed block
        id: String,
        /// The full vote accumulator that committed it
        votes: Vote,
    },
    /// A bootstrap peer reported a different external address for us
    PublicIpChanged {
        /// The newly observed IP
        ip: String,
        /// The unchanged overlay port
        port: u16,
        /// Always true: bootstrap peers are authoritative for this
        authoritative: bool,
    },
}

/// Where candidate blocks come from.
///
/// Block production itself (transactions, state roots, fork choice) lives
/// in the external block module; the driver only asks it for the candidate
/// to propose when our slot comes up.
pub trait BlockSource: Send + Sync {
    /// The candidate block for the slot containing `timestamp`, if any
    fn candidate(&self, timestamp: i32) -> Option<BlockHeader>;
}

/// A one-deep candidate mailbox the external block module writes into
#[derive(Clone, Default)]
pub struct CandidateFeed {
    slot: Arc<RwLock<Option<BlockHeader>>>,
}

impl CandidateFeed {
    /// Create an empty feed
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer the next candidate block, replacing any unconsumed one
    pub fn offer(&self, block: BlockHeader) {
        *self.slot.write() = Some(block);
    }
}

impl BlockSource for CandidateFeed {
    fn candidate(&self, timestamp: i32) -> Option<BlockHeader> {
        self.slot.write().take().map(|mut block| {
            block.timestamp = timestamp;
            block
        })
    }
}

/// Routes point-to-point `/peer/propose` and `/peer/votes` calls into the
/// same topic registry the gossip path feeds.
pub struct DriverDispatch {
    registry: Arc<TopicRegistry>,
}

impl DriverDispatch {
    /// Wrap the driver's topic registry
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PeerDispatch for DriverDispatch {
    async fn dispatch(&self, method: &str, params: Value) -> Option<Value> {
        match method {
            topic::PROPOSE | topic::VOTES => {
                // The HTTP path carries no overlay identity; an unspecified
                // contact stands in for the source peer.
                let from = Contact::new("0.0.0.0", 0, 0);
                let accepted = self
                    .registry
                    .dispatch(GossipMessage::new(method, params), from)
                    .await;
                Some(json!({ "accepted": accepted }))
            }
            _ => None,
        }
    }
}

/// ConsensusDriver orchestrates overlay events, gossip topics and the
/// consensus engine.
pub struct ConsensusDriver {
    engine: ConsensusEngine,
    delegates: Arc<dyn DelegateRegistry>,
    gossip: GossipService,
    registry: Arc<TopicRegistry>,
    propose_rx: mpsc::Receiver<(GossipMessage, Contact)>,
    votes_rx: mpsc::Receiver<(GossipMessage, Contact)>,
    dht_events: mpsc::Receiver<DhtEvent>,
    peer_client: PeerClient,
    keypairs: Vec<KeyPair>,
    block_source: Arc<dyn BlockSource>,
    chain_tx: mpsc::Sender<ChainEvent>,
    metrics: Arc<Metrics>,
    env: EnvContext,
    epoch: i64,
    address: String,
    acquireip: bool,
    last_proposed_slot: Option<u64>,
}

impl ConsensusDriver {
    /// Wire a driver. Returns the driver, the topic registry (for the
    /// point-to-point dispatch path) and the chain event stream.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: ConsensusEngine,
        delegates: Arc<dyn DelegateRegistry>,
        gossip: GossipService,
        dht_events: mpsc::Receiver<DhtEvent>,
        peer_client: PeerClient,
        keypairs: Vec<KeyPair>,
        block_source: Arc<dyn BlockSource>,
        metrics: Arc<Metrics>,
        config: &NodeConfig,
    ) -> (Self, Arc<TopicRegistry>, mpsc::Receiver<ChainEvent>) {
        let mut registry = TopicRegistry::new();
        let propose_rx = registry.subscribe(topic::PROPOSE);
        let votes_rx = registry.subscribe(topic::VOTES);
        let registry = Arc::new(registry);

        let (chain_tx, chain_rx) = mpsc::channel(64);
        let address = gossip.dht().local().endpoint();

        let driver = Self {
            engine,
            delegates,
            gossip,
            registry: Arc::clone(&registry),
            propose_rx,
            votes_rx,
            dht_events,
            peer_client,
            keypairs,
            block_source,
            chain_tx,
            metrics,
            env: config.env(),
            epoch: config.slots.epoch,
            address,
            acquireip: config.acquireip,
            last_proposed_slot: None,
        };
        (driver, registry, chain_rx)
    }

    /// Run the consensus event loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.acquireip {
            self.discover_public_ip().await;
        }

        let interval_ms = (self.engine.slots().interval() as u64 * 1000 / 2).max(250);
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(address = %self.address, "consensus driver started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                Some(event) = self.dht_events.recv() => self.on_dht_event(event).await,
                Some((message, _from)) = self.propose_rx.recv() => self.on_propose(message).await,
                Some((message, _from)) = self.votes_rx.recv() => self.on_votes(message).await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("consensus driver stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Epoch-relative seconds now
    fn now_ts(&self) -> i32 {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        (unix - self.epoch).clamp(0, i32::MAX as i64) as i32
    }

    // ── Slot handling ───────────────────────────────────────────────────

    async fn on_tick(&mut self) {
        let now = self.now_ts();

        // A pending block from an earlier slot expired with its round
        if self.engine.pending_block().is_some() && !self.engine.has_pending_block(now) {
            debug!("slot boundary, clearing stale round");
            self.metrics.incr("driver.rounds_expired");
            self.engine.clear_state();
        }

        self.maybe_propose(now).await;
    }

    async fn maybe_propose(&mut self, now: i32) {
        let slot = self.engine.slots().slot_of(now);
        if self.last_proposed_slot == Some(slot) || self.engine.has_pending_block(now) {
            return;
        }
        let Some(elected) = self.delegates.delegate_for_slot(slot) else {
            return;
        };
        let Some(keypair) = self
            .keypairs
            .iter()
            .find(|kp| kp.public_key() == elected)
            .cloned()
        else {
            return;
        };
        let Some(candidate) = self.block_source.candidate(now) else {
            trace!(slot, "our slot, no candidate block");
            return;
        };
        if candidate.generator_public_key != elected {
            warn!("candidate generator is not the elected delegate");
            return;
        }

        self.last_proposed_slot = Some(slot);
        info!(slot, height = candidate.height, "our slot, proposing");

        // Mining blocks the thread up to pow_timeout; keep the runtime
        // responsive while it runs.
        let env = self.env;
        let address = self.address.clone();
        let propose = tokio::task::block_in_place(|| {
            self.engine.create_propose(&keypair, &candidate, &address, &env)
        });
        let propose = match propose {
            Ok(propose) => propose,
            Err(e) => {
                warn!(error = %e, "proposal failed, slot abandoned");
                self.metrics.incr("driver.propose_failed");
                return;
            }
        };

        self.engine.set_pending_block(candidate.clone());
        match serde_json::to_value(&propose) {
            Ok(payload) => {
                self.gossip.publish(topic::PROPOSE, payload, 1).await;
            }
            Err(e) => warn!(error = %e, "proposal encode failed"),
        }

        // Our own signatures count toward the threshold too
        self.vote_for(&candidate).await;
    }

    // ── Gossip topic handling ───────────────────────────────────────────

    async fn on_propose(&mut self, message: GossipMessage) {
        let propose: Propose = match serde_json::from_value(message.payload) {
            Ok(propose) => propose,
            Err(e) => {
                debug!(error = %e, "undecodable proposal dropped");
                self.metrics.incr("driver.bad_payload");
                return;
            }
        };

        let now = self.now_ts();
        let propose_slot = self.engine.slots().slot_of(propose.timestamp);
        let current_slot = self.engine.slots().slot_of(now);
        if propose_slot != current_slot {
            debug!(got = propose_slot, current = current_slot, "stale proposal dropped");
            self.metrics.incr("driver.propose_stale");
            return;
        }
        if self.engine.has_pending_block(propose.timestamp) {
            trace!("already holding a pending block this slot");
            return;
        }
        if self.delegates.delegate_for_slot(propose_slot) != Some(propose.generator_public_key) {
            debug!(slot = propose_slot, "proposal from a non-elected delegate dropped");
            self.metrics.incr("driver.propose_wrong_delegate");
            return;
        }

        if let Err(e) = self.engine.accept_propose(&propose, &self.env) {
            debug!(error = %e, height = propose.height, "proposal rejected");
            return;
        }

        let block = BlockHeader::new(
            propose.height,
            propose.id.clone(),
            propose.timestamp,
            propose.generator_public_key,
        );
        self.engine.set_pending_block(block.clone());
        self.vote_for(&block).await;
    }

    async fn on_votes(&mut self, message: GossipMessage) {
        let relay_budget = message.recursive;
        let vote: Vote = match serde_json::from_value(message.payload) {
            Ok(vote) => vote,
            Err(e) => {
                debug!(error = %e, "undecodable vote bundle dropped");
                self.metrics.incr("driver.bad_payload");
                return;
            }
        };

        let accumulator = match self.engine.add_pending_votes(&vote, &self.env) {
            Ok(accumulator) => accumulator,
            Err(e) => {
                debug!(error = %e, "vote bundle dropped");
                return;
            }
        };
        self.check_commit(accumulator).await;

        // Well-supported remote bundles travel one more hop
        if relay_budget > 0 && self.engine.has_enough_votes_remote(&vote) {
            if let Ok(payload) = serde_json::to_value(&vote) {
                self.gossip
                    .publish(topic::VOTES, payload, relay_budget - 1)
                    .await;
            }
        }
    }

    async fn vote_for(&mut self, block: &BlockHeader) {
        let votes = match self.engine.create_votes(&self.keypairs, block, &self.env) {
            Ok(votes) if !votes.signatures.is_empty() => votes,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "vote creation failed");
                return;
            }
        };

        let accumulator = match self.engine.add_pending_votes(&votes, &self.env) {
            Ok(accumulator) => accumulator,
            Err(e) => {
                debug!(error = %e, "own votes not aggregated");
                return;
            }
        };

        match serde_json::to_value(&votes) {
            Ok(payload) => {
                self.gossip.publish(topic::VOTES, payload, 1).await;
            }
            Err(e) => warn!(error = %e, "vote encode failed"),
        }

        self.check_commit(accumulator).await;
    }

    async fn check_commit(&mut self, accumulator: Vote) {
        if !self.engine.has_enough_votes(&accumulator) {
            return;
        }
        info!(
            height = accumulator.height,
            id = %accumulator.id,
            signatures = accumulator.signatures.len(),
            "block committable"
        );
        self.metrics.incr("driver.blocks_committed");
        let event = ChainEvent::Committed {
            height: accumulator.height,
            id: accumulator.id.clone(),
            votes: accumulator,
        };
        if self.chain_tx.send(event).await.is_err() {
            warn!("chain event consumer gone");
        }
        self.engine.clear_state();
    }

    // ── Overlay events ──────────────────────────────────────────────────

    async fn on_dht_event(&mut self, event: DhtEvent) {
        match event {
            DhtEvent::Broadcast { message, from } => {
                self.registry.dispatch(message, from).await;
            }
            DhtEvent::NodeAdded(node) => {
                trace!(node = %node, "peer added");
            }
            DhtEvent::NodeRemoved { id, reason } => {
                trace!(%id, ?reason, "peer removed");
            }
        }
    }

    // ── Self-IP discovery ──────────────────────────────────────────────

    async fn discover_public_ip(&mut self) {
        let seeds = self.gossip.dht().seeds().to_vec();
        for seed in &seeds {
            match self.peer_client.p2p_helper(seed).await {
                Ok(ip) => {
                    let local = self.gossip.dht().local();
                    if ip != local.host && ip.parse::<Ipv4Addr>().is_ok() {
                        info!(%ip, "bootstrap peer reports a new external address");
                        let port = local.port;
                        self.gossip
                            .dht()
                            .set_local(Contact::new(ip.clone(), port, unix_millis()));
                        self.address = format!("{}:{}", ip, port);
                        let event = ChainEvent::PublicIpChanged {
                            ip,
                            port,
                            authoritative: true,
                        };
                        let _ = self.chain_tx.send(event).await;
                    }
                    // The first answering seed settles it
                    return;
                }
                Err(e) => debug!(seed = %seed, error = %e, "p2phelper probe failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotsConfig;
    use ember_consensus::{ConsensusEngine, StaticDelegates, ThreadMiner};
    use ember_network::{DhtConfig, DhtService, PeerClientConfig};

    fn unix_now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    async fn test_overlay(
        metrics: Arc<Metrics>,
    ) -> (GossipService, mpsc::Receiver<DhtEvent>) {
        let local = Contact::new("127.0.0.1", 0, 0);
        let config = DhtConfig {
            persistent: false,
            ..DhtConfig::new(local, "127.0.0.1:0".parse().unwrap(), Vec::new())
        };
        let (dht, events) = DhtService::new(config, None, metrics).await.unwrap();
        dht.start().await.unwrap();
        (GossipService::new(dht), events)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_delegate_round_commits() {
        let keypair = KeyPair::from_seed([9; 32]);
        let delegates = Arc::new(StaticDelegates::from_ring(vec![keypair.public_key()]));
        let metrics = Arc::new(Metrics::new());
        let (gossip, dht_events) = test_overlay(Arc::clone(&metrics)).await;

        // One delegate, short slots, a 1-bit difficulty that mines in
        // microseconds, and the epoch pinned just behind the wall clock
        let mut config = NodeConfig::default();
        config.acquireip = false;
        config.slots = SlotsConfig {
            interval: 2,
            delegates: 1,
            leading: 1,
            pow_timeout_ms: 5_000,
            epoch: unix_now() - 100,
        };

        let engine = ConsensusEngine::new(
            config.slot_clock(),
            delegates.clone(),
            Arc::new(ThreadMiner::new(2)),
            Arc::clone(&metrics),
        );

        let feed = CandidateFeed::new();
        feed.offer(BlockHeader::new(1, "12345", 0, keypair.public_key()));

        let client = PeerClient::new(PeerClientConfig::default()).unwrap();
        let (driver, _registry, mut chain_rx) = ConsensusDriver::new(
            engine,
            delegates,
            gossip,
            dht_events,
            client,
            vec![keypair],
            Arc::new(feed),
            metrics,
            &config,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(driver.run(shutdown_rx));

        // With a single delegate the threshold is floor(2/3)=0, so our own
        // vote commits the block.
        let event = tokio::time::timeout(Duration::from_secs(10), chain_rx.recv())
            .await
            .expect("round should commit within the window")
            .unwrap();
        match event {
            ChainEvent::Committed { height, id, votes } => {
                assert_eq!(height, 1);
                assert_eq!(id, "12345");
                assert_eq!(votes.signatures.len(), 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_vote_only_node_commits_on_remote_propose() {
        // Two delegates: the proposer's keypair is remote, ours only votes.
        let proposer = KeyPair::from_seed([1; 32]);
        let voter = KeyPair::from_seed([2; 32]);
        let delegates = Arc::new(StaticDelegates::from_ring(vec![
            proposer.public_key(),
            voter.public_key(),
        ]));
        let metrics = Arc::new(Metrics::new());
        let (gossip, dht_events) = test_overlay(Arc::clone(&metrics)).await;

        let mut config = NodeConfig::default();
        config.acquireip = false;
        config.slots = SlotsConfig {
            interval: 1_000_000, // one huge slot, no boundary during the test
            delegates: 2,
            leading: 1,
            pow_timeout_ms: 5_000,
            epoch: unix_now() - 100,
        };

        let engine = ConsensusEngine::new(
            config.slot_clock(),
            delegates.clone(),
            Arc::new(ThreadMiner::new(2)),
            Arc::clone(&metrics),
        );

        // Build the proposal the way the remote proposer would. Slot 0
        // elects ring position 0, the proposer.
        let now = (unix_now() - config.slots.epoch) as i32;
        let block = BlockHeader::new(7, "555", now, proposer.public_key());
        let propose = engine
            .create_propose(&proposer, &block, "127.0.0.1:7000", &config.env())
            .unwrap();

        let client = PeerClient::new(PeerClientConfig::default()).unwrap();
        let (driver, registry, mut chain_rx) = ConsensusDriver::new(
            engine,
            delegates,
            gossip,
            dht_events,
            client,
            vec![voter.clone()],
            Arc::new(CandidateFeed::new()),
            metrics,
            &config,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(driver.run(shutdown_rx));

        // Deliver the proposal the way the peer-RPC path does
        let payload = serde_json::to_value(&propose).unwrap();
        let from = Contact::new("127.0.0.1", 7000, 0);
        assert!(
            registry
                .dispatch(GossipMessage::new(topic::PROPOSE, payload), from.clone())
                .await
        );

        // Our vote alone is not enough (threshold for 2 delegates is
        // floor(4/3)=1, strict: 2 votes). The proposer's vote arrives as a
        // remote bundle and completes the round.
        let vote_digest =
            ember_types::codec::vote_digest(block.height, &block.id, &config.env()).unwrap();
        let remote_vote = Vote {
            height: block.height,
            id: block.id.clone(),
            timestamp: block.timestamp,
            signatures: vec![ember_types::VoteItem {
                key: proposer.public_key(),
                signature: proposer.sign(vote_digest.as_bytes()),
            }],
        };
        let payload = serde_json::to_value(&remote_vote).unwrap();
        assert!(
            registry
                .dispatch(GossipMessage::new(topic::VOTES, payload), from)
                .await
        );

        let event = tokio::time::timeout(Duration::from_secs(10), chain_rx.recv())
            .await
            .expect("round should commit within the window")
            .unwrap();
        match event {
            ChainEvent::Committed { height, id, votes } => {
                assert_eq!(height, 7);
                assert_eq!(id, "555");
                assert_eq!(votes.signatures.len(), 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let _ = shutdown_tx.send(true);
    }
}
