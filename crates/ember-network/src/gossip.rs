//! Topic-based gossip over the overlay.
//!
//! Publishing fans a message out to a bounded random sample of the health
//! set (falling back to the bootstrap seeds when the table is empty).
//! Dispatch is content-addressed and at-least-once: receivers must
//! tolerate duplicates, reordering and drops.

use crate::dht::DhtService;
use crate::types::{GossipMessage, Node};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Peers a single publish fans out to
pub const GOSSIP_FANOUT: usize = 20;

/// Well-known gossip topics
pub mod topic {
    /// Block proposals
    pub const PROPOSE: &str = "propose";
    /// Vote bundles
    pub const VOTES: &str = "votes";
}

/// Publishes topic messages over the overlay
#[derive(Clone)]
pub struct GossipService {
    dht: DhtService,
}

impl GossipService {
    /// Wrap an overlay service
    pub fn new(dht: DhtService) -> Self {
        Self { dht }
    }

    /// The underlying overlay
    pub fn dht(&self) -> &DhtService {
        &self.dht
    }

    /// Publish a payload on a topic to up to [`GOSSIP_FANOUT`] random
    /// healthy peers; when the health set is empty, fall back to the
    /// bootstrap seeds. Returns how many sends went out.
    pub async fn publish(&self, topic: &str, payload: Value, recursive: u8) -> usize {
        let mut peers = self.dht.table().read().random_nodes(GOSSIP_FANOUT);
        if peers.is_empty() {
            peers = self.dht.seeds().to_vec();
            peers.truncate(GOSSIP_FANOUT);
        }
        if peers.is_empty() {
            debug!(topic, "no peers to publish to");
            return 0;
        }

        let message = GossipMessage {
            topic: topic.to_string(),
            recursive,
            payload,
        };
        let sent = self.dht.broadcast_to(&peers, &message).await;
        trace!(topic, sent, "published");
        sent
    }
}

/// Topic → handler registry.
///
/// Owned by the consensus side: the overlay only surfaces a broadcast
/// event, and whoever holds the registry routes it. Unknown topics are
/// dropped.
#[derive(Default)]
pub struct TopicRegistry {
    handlers: HashMap<String, mpsc::Sender<(GossipMessage, Node)>>,
}

impl TopicRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic; messages for it arrive on the returned receiver
    pub fn subscribe(&mut self, topic: &str) -> mpsc::Receiver<(GossipMessage, Node)> {
        let (tx, rx) = mpsc::channel(256);
        self.handlers.insert(topic.to_string(), tx);
        rx
    }

    /// Route a received message to its topic handler. Returns `false` when
    /// the topic is unknown (the message is dropped) or the handler is
    /// gone.
    pub async fn dispatch(&self, message: GossipMessage, from: Node) -> bool {
        let Some(handler) = self.handlers.get(&message.topic) else {
            trace!(topic = %message.topic, "unknown topic dropped");
            return false;
        };
        handler.send((message, from)).await.is_ok()
    }
}
