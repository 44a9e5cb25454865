//! UDP overlay service: bootstrap, ingest, persistence and maintenance.
//!
//! All overlay failures are logged and suppressed here; nothing in this
//! module propagates an error into the consensus core.

use crate::error::{DhtError, DhtResult};
use crate::table::{InsertOutcome, RoutingTable, BUCKET_SIZE};
use crate::types::{unix_millis, DhtEvent, GossipMessage, Node, Packet, RemovalReason};
use ember_metrics::Metrics;
use ember_primitives::NodeId;
use ember_storage::{NodeRecord, NodeStore};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How often the routing table is flushed to the persistent store
pub const SAVE_PEERS_INTERVAL: Duration = Duration::from_secs(60);

/// How often buckets are checked for staleness and re-queried
pub const CHECK_BUCKET_OUTDATE: Duration = Duration::from_secs(180);

/// How often missing bootstrap seeds are re-inserted
pub const RECONNECT_SEED_INTERVAL: Duration = Duration::from_secs(30);

/// Nodes not seen for this long are evicted at flush time
const STALE_NODE_AGE: Duration = Duration::from_secs(3600);

/// Random nodes re-queried per stale bucket
const REFRESH_QUERIES: usize = 3;

/// Maximum UDP datagram we accept
const MAX_DATAGRAM: usize = 64 * 1024;

/// Overlay service configuration
#[derive(Debug, Clone)]
pub struct DhtConfig {
    /// Our own contact as peers should reach us
    pub local: Node,
    /// Bind address for the overlay socket
    pub listen: SocketAddr,
    /// Bootstrap seed contacts
    pub seeds: Vec<Node>,
    /// Hosts whose packets are dropped on ingest
    pub blacklist: Vec<String>,
    /// Whether the routing table is persisted
    pub persistent: bool,
    /// Table flush period
    pub save_peers_interval: Duration,
    /// Bucket staleness check period
    pub check_bucket_interval: Duration,
    /// Seed reconnect period
    pub reconnect_seed_interval: Duration,
}

impl DhtConfig {
    /// Config with production timer defaults
    pub fn new(local: Node, listen: SocketAddr, seeds: Vec<Node>) -> Self {
        Self {
            local,
            listen,
            seeds,
            blacklist: Vec::new(),
            persistent: true,
            save_peers_interval: SAVE_PEERS_INTERVAL,
            check_bucket_interval: CHECK_BUCKET_OUTDATE,
            reconnect_seed_interval: RECONNECT_SEED_INTERVAL,
        }
    }
}

/// The Kademlia-style overlay service.
///
/// Owns the routing table and the persistent node store; everything above
/// it sees only the event stream and the send/broadcast surface.
#[derive(Clone)]
pub struct DhtService {
    config: DhtConfig,
    table: Arc<RwLock<RoutingTable>>,
    socket: Arc<UdpSocket>,
    store: Option<Arc<NodeStore>>,
    event_tx: mpsc::Sender<DhtEvent>,
    metrics: Arc<Metrics>,
    running: Arc<RwLock<bool>>,
}

impl DhtService {
    /// Bind the overlay socket and build the service. Returns the service
    /// and the upward event stream.
    pub async fn new(
        mut config: DhtConfig,
        store: Option<Arc<NodeStore>>,
        metrics: Arc<Metrics>,
    ) -> DhtResult<(Self, mpsc::Receiver<DhtEvent>)> {
        let socket = UdpSocket::bind(config.listen).await?;

        // With an ephemeral bind, re-derive the local contact from the
        // actual port so the advertised identity matches reality.
        let actual_port = socket.local_addr()?.port();
        if config.local.port != actual_port {
            config.local = Node::new(config.local.host.clone(), actual_port, unix_millis());
        }

        let table = RoutingTable::new(config.local.clone(), config.blacklist.clone());
        let (event_tx, event_rx) = mpsc::channel(1024);

        Ok((
            Self {
                config,
                table: Arc::new(RwLock::new(table)),
                socket: Arc::new(socket),
                store,
                event_tx,
                metrics,
                running: Arc::new(RwLock::new(false)),
            },
            event_rx,
        ))
    }

    /// Our own contact
    pub fn local(&self) -> Node {
        self.table.read().local().clone()
    }

    /// Shared handle to the routing table
    pub fn table(&self) -> Arc<RwLock<RoutingTable>> {
        Arc::clone(&self.table)
    }

    /// Bootstrap seed contacts
    pub fn seeds(&self) -> &[Node] {
        &self.config.seeds
    }

    /// Current health set
    pub fn healthy_nodes(&self) -> Vec<Node> {
        self.table.read().healthy_nodes()
    }

    /// Whether the service loops are running
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Replace the advertised local contact (self-IP discovery)
    pub fn set_local(&self, local: Node) {
        self.table.write().set_local(local);
    }

    /// Start the overlay: replay persisted peers, ping the seeds, then run
    /// the ingest and maintenance loops.
    pub async fn start(&self) -> DhtResult<()> {
        if *self.running.read() {
            return Err(DhtError::AlreadyRunning);
        }
        *self.running.write() = true;

        // Persisted peers come back before bootstrap completes
        if let Some(store) = &self.store {
            match store.all() {
                Ok(records) => {
                    let count = records.len();
                    for record in records {
                        self.insert_node(record.into()).await;
                    }
                    info!(count, "persisted peers replayed");
                }
                Err(e) => warn!(error = %e, "could not replay persisted peers"),
            }
        }

        // Bootstrap: introduce ourselves to every seed
        for seed in &self.config.seeds {
            self.send_to_node(&Packet::Ping { from: self.local() }, seed)
                .await;
        }
        info!(
            listen = %self.config.listen,
            seeds = self.config.seeds.len(),
            "overlay started"
        );

        let ingest = self.clone();
        tokio::spawn(async move { ingest.ingest_loop().await });

        let maintenance = self.clone();
        tokio::spawn(async move { maintenance.maintenance_loop().await });

        Ok(())
    }

    /// Stop the service loops
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Fan a gossip message out to the given peers. Send failures are
    /// logged and skipped; returns how many sends went out.
    pub async fn broadcast_to(&self, peers: &[Node], message: &GossipMessage) -> usize {
        let mut sent = 0;
        for peer in peers {
            let packet = Packet::Broadcast {
                from: self.local(),
                message: message.clone(),
            };
            if self.send_to_node(&packet, peer).await {
                sent += 1;
            }
        }
        self.metrics.counter("dht.broadcast_sent", sent as u64);
        sent
    }

    /// Send a packet to a node's endpoint. Returns whether the datagram
    /// went out.
    async fn send_to_node(&self, packet: &Packet, node: &Node) -> bool {
        let Some(addr) = node.socket_addr() else {
            debug!(node = %node, "unroutable endpoint");
            return false;
        };
        self.send_to_addr(packet, addr).await
    }

    async fn send_to_addr(&self, packet: &Packet, addr: SocketAddr) -> bool {
        let bytes = match serde_json::to_vec(packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "packet encode failed");
                return false;
            }
        };
        match self.socket.send_to(&bytes, addr).await {
            Ok(_) => true,
            Err(e) => {
                debug!(%addr, error = %e, "send failed");
                false
            }
        }
    }

    async fn ingest_loop(self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        while *self.running.read() {
            let (len, src) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "overlay recv failed");
                    continue;
                }
            };
            let packet: Packet = match serde_json::from_slice(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(%src, error = %e, "undecodable packet dropped");
                    self.metrics.incr("dht.packets_undecodable");
                    continue;
                }
            };
            self.handle_packet(packet, src).await;
        }
    }

    async fn handle_packet(&self, packet: Packet, src: SocketAddr) {
        let mut from = packet.from_node().clone();

        {
            let table = self.table.read();
            if table.is_blacklisted(&from.host) || table.is_blacklisted(&src.ip().to_string()) {
                self.metrics.incr("dht.packets_blacklisted");
                return;
            }
            if from.id == table.local().id {
                return;
            }
        }

        from.touch(unix_millis());
        self.insert_node(from.clone()).await;
        self.metrics.incr("dht.packets_in");

        match packet {
            Packet::Ping { .. } => {
                self.send_to_addr(&Packet::Pong { from: self.local() }, src)
                    .await;
            }
            Packet::Pong { .. } => {}
            Packet::FindNode { target, .. } => {
                let nodes = self.table.read().closest(&target, BUCKET_SIZE);
                self.send_to_addr(
                    &Packet::Neighbors {
                        from: self.local(),
                        nodes,
                    },
                    src,
                )
                .await;
            }
            Packet::Neighbors { nodes, .. } => {
                let now = unix_millis();
                for mut node in nodes {
                    // Carried timestamps never run ahead of our clock
                    node.seen = node.seen.min(now);
                    self.insert_node(node).await;
                }
            }
            Packet::Broadcast { message, .. } => {
                if self
                    .event_tx
                    .send(DhtEvent::Broadcast { message, from })
                    .await
                    .is_err()
                {
                    debug!("event channel closed, broadcast dropped");
                }
            }
        }
    }

    async fn insert_node(&self, node: Node) {
        let outcome = self.table.write().insert(node.clone());
        match outcome {
            InsertOutcome::Added => {
                debug!(node = %node, "node added");
                let _ = self.event_tx.send(DhtEvent::NodeAdded(node)).await;
            }
            InsertOutcome::Replaced { evicted } => {
                let _ = self.event_tx.send(DhtEvent::NodeAdded(node)).await;
                let _ = self
                    .event_tx
                    .send(DhtEvent::NodeRemoved {
                        id: evicted.id,
                        reason: RemovalReason::Evicted,
                    })
                    .await;
            }
            InsertOutcome::Refreshed | InsertOutcome::Rejected => {}
        }
        self.metrics
            .gauge("dht.table_size", self.table.read().len() as i64);
    }

    async fn maintenance_loop(self) {
        let mut save_peers = tokio::time::interval(self.config.save_peers_interval);
        let mut check_buckets = tokio::time::interval(self.config.check_bucket_interval);
        let mut reconnect_seeds = tokio::time::interval(self.config.reconnect_seed_interval);
        save_peers.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        check_buckets.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        reconnect_seeds.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while *self.running.read() {
            tokio::select! {
                _ = save_peers.tick() => self.flush_peers().await,
                _ = check_buckets.tick() => self.refresh_stale_buckets().await,
                _ = reconnect_seeds.tick() => self.reconnect_missing_seeds().await,
            }
        }
    }

    async fn flush_peers(&self) {
        let cutoff = unix_millis() - STALE_NODE_AGE.as_millis() as i64;
        let evicted = self.table.write().evict_seen_before(cutoff);
        for node in evicted {
            let _ = self
                .event_tx
                .send(DhtEvent::NodeRemoved {
                    id: node.id,
                    reason: RemovalReason::Stale,
                })
                .await;
        }

        if !self.config.persistent {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        let records: Vec<NodeRecord> = self
            .table
            .read()
            .all_nodes()
            .iter()
            .map(NodeRecord::from)
            .collect();
        let flushed = store
            .put_all(&records)
            .and_then(|()| store.prune_seen_before(cutoff).map(|_| ()))
            .and_then(|()| store.compact());
        if let Err(e) = flushed {
            warn!(error = %e, "peer flush failed");
            self.metrics.incr("dht.persistence_errors");
        }
    }

    async fn refresh_stale_buckets(&self) {
        let stale = self
            .table
            .read()
            .stale_buckets(self.config.check_bucket_interval);
        if stale.is_empty() {
            return;
        }
        debug!(buckets = stale.len(), "refreshing stale buckets");

        for index in stale {
            let target = NodeId::from_bytes(rand::random::<[u8; 20]>());
            let queried = self.table.read().random_nodes(REFRESH_QUERIES);
            for node in queried {
                self.send_to_node(
                    &Packet::FindNode {
                        from: self.local(),
                        target,
                    },
                    &node,
                )
                .await;
            }
            self.table.write().mark_refreshed(index);
        }
    }

    async fn reconnect_missing_seeds(&self) {
        let local_id = self.local().id;
        for seed in &self.config.seeds {
            if seed.id == local_id {
                continue;
            }
            if !self.table.read().contains(&seed.id) {
                debug!(seed = %seed, "re-adding missing seed");
                self.send_to_node(&Packet::Ping { from: self.local() }, seed)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    async fn service(seeds: Vec<Node>) -> (DhtService, mpsc::Receiver<DhtEvent>) {
        let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let local = Node::new("127.0.0.1", 0, 0);
        let config = DhtConfig {
            persistent: false,
            ..DhtConfig::new(local, listen, seeds)
        };
        DhtService::new(config, None, Arc::new(Metrics::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_rewrites_local_port() {
        let (dht, _events) = service(Vec::new()).await;
        let local = dht.local();
        assert_ne!(local.port, 0);
        assert_eq!(local.id, Node::derive_id("127.0.0.1", local.port));
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let (dht, _events) = service(Vec::new()).await;
        dht.start().await.unwrap();
        assert!(matches!(dht.start().await, Err(DhtError::AlreadyRunning)));
        dht.stop();
    }

    #[tokio::test]
    async fn test_bootstrap_handshake() {
        let (a, mut a_events) = service(Vec::new()).await;
        a.start().await.unwrap();

        // B bootstraps off A
        let (b, mut b_events) = service(vec![a.local()]).await;
        b.start().await.unwrap();

        // A learns B from the ping, B learns A from the pong
        let added_on_a = timeout(Duration::from_secs(2), a_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(added_on_a, DhtEvent::NodeAdded(ref n) if n.id == b.local().id));

        let added_on_b = timeout(Duration::from_secs(2), b_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(added_on_b, DhtEvent::NodeAdded(ref n) if n.id == a.local().id));

        assert!(a.table().read().contains(&b.local().id));
        assert!(b.table().read().contains(&a.local().id));

        a.stop();
        b.stop();
    }

    #[tokio::test]
    async fn test_broadcast_surfaces_event() {
        let (a, _a_events) = service(Vec::new()).await;
        a.start().await.unwrap();
        let (b, mut b_events) = service(vec![a.local()]).await;
        b.start().await.unwrap();
        sleep(Duration::from_millis(200)).await;

        let message = GossipMessage::new("propose", serde_json::json!({"height": 9}));
        let sent = a.broadcast_to(&[b.local()], &message).await;
        assert_eq!(sent, 1);

        // Skip the NodeAdded event(s), wait for the broadcast
        let event = loop {
            let event = timeout(Duration::from_secs(2), b_events.recv())
                .await
                .unwrap()
                .unwrap();
            if let DhtEvent::Broadcast { .. } = event {
                break event;
            }
        };
        match event {
            DhtEvent::Broadcast { message, from } => {
                assert_eq!(message.topic, "propose");
                assert_eq!(from.id, a.local().id);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        a.stop();
        b.stop();
    }

    #[tokio::test]
    async fn test_persisted_peers_replayed_before_bootstrap() {
        use ember_storage::StoreConfig;

        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(NodeStore::open(dir.path(), StoreConfig::default()).unwrap());
        let peer = Node::new("10.9.9.9", 7000, unix_millis());
        store.put(&NodeRecord::from(&peer)).unwrap();

        let local = Node::new("127.0.0.1", 0, 0);
        let config = DhtConfig::new(local, "127.0.0.1:0".parse().unwrap(), Vec::new());
        let (dht, mut events) = DhtService::new(config, Some(store), Arc::new(Metrics::new()))
            .await
            .unwrap();
        dht.start().await.unwrap();

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, DhtEvent::NodeAdded(ref n) if n.id == peer.id));
        assert!(dht.table().read().contains(&peer.id));

        dht.stop();
    }

    #[tokio::test]
    async fn test_blacklisted_packets_dropped() {
        let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let local = Node::new("127.0.0.1", 0, 0);
        let mut config = DhtConfig::new(local, listen, Vec::new());
        config.persistent = false;
        config.blacklist = vec!["127.0.0.1".to_string()];
        let (a, _events) = DhtService::new(config, None, Arc::new(Metrics::new()))
            .await
            .unwrap();
        a.start().await.unwrap();

        let (b, _b_events) = service(vec![a.local()]).await;
        b.start().await.unwrap();
        sleep(Duration::from_millis(300)).await;

        // Everything from 127.0.0.1 is dropped on ingest
        assert!(a.table().read().is_empty());

        a.stop();
        b.stop();
    }
}
