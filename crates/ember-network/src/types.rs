//! Overlay wire and event types

use ember_crypto::ripemd160;
use ember_primitives::NodeId;
use ember_storage::NodeRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A known overlay node.
///
/// The id is canonical: RIPEMD-160 of the `host:port` endpoint string.
/// Two endpoints that collide under RIPEMD-160 are treated as the same
/// node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Canonical node identifier
    pub id: NodeId,
    /// Host address (IPv4 dotted quad)
    pub host: String,
    /// Overlay UDP port
    pub port: u16,
    /// Last-seen unix timestamp in milliseconds
    pub seen: i64,
}

impl Node {
    /// Create a node, deriving its id from the endpoint
    pub fn new(host: impl Into<String>, port: u16, seen: i64) -> Self {
        let host = host.into();
        let id = Self::derive_id(&host, port);
        Self {
            id,
            host,
            port,
            seen,
        }
    }

    /// Canonical id for an endpoint
    pub fn derive_id(host: &str, port: u16) -> NodeId {
        ripemd160(format!("{}:{}", host, port).as_bytes())
    }

    /// The `host:port` endpoint string
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The endpoint as a socket address, if the host parses
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.endpoint().parse().ok()
    }

    /// Update the last-seen timestamp
    pub fn touch(&mut self, now: i64) {
        self.seen = now;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        NodeRecord {
            id: node.id,
            host: node.host.clone(),
            port: node.port,
            seen: node.seen,
        }
    }
}

impl From<NodeRecord> for Node {
    fn from(record: NodeRecord) -> Self {
        Node {
            id: record.id,
            host: record.host,
            port: record.port,
            seen: record.seen,
        }
    }
}

/// A topic-addressed gossip message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    /// Subscription topic
    pub topic: String,
    /// Remaining relay depth (1 = one-hop fan-out)
    pub recursive: u8,
    /// JSON payload
    pub payload: Value,
}

impl GossipMessage {
    /// Create a message with the default one-hop relay depth
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            recursive: 1,
            payload,
        }
    }
}

/// Overlay wire packets (JSON over UDP)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    /// Liveness probe; also how a node introduces itself
    Ping {
        /// Sender contact
        from: Node,
    },
    /// Probe answer
    Pong {
        /// Sender contact
        from: Node,
    },
    /// Ask for the peers closest to a target id
    FindNode {
        /// Sender contact
        from: Node,
        /// Lookup target
        target: NodeId,
    },
    /// Answer to a lookup
    Neighbors {
        /// Sender contact
        from: Node,
        /// Closest known nodes to the requested target
        nodes: Vec<Node>,
    },
    /// One hop of a gossip fan-out
    Broadcast {
        /// Sender contact
        from: Node,
        /// The gossiped message
        message: GossipMessage,
    },
}

impl Packet {
    /// The sender contact carried by any packet
    pub fn from_node(&self) -> &Node {
        match self {
            Packet::Ping { from }
            | Packet::Pong { from }
            | Packet::FindNode { from, .. }
            | Packet::Neighbors { from, .. }
            | Packet::Broadcast { from, .. } => from,
        }
    }
}

/// Why a node left the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Not seen within the staleness window
    Stale,
    /// Evicted by a fresher node in a full bucket
    Evicted,
}

/// Events the overlay surfaces upward
#[derive(Debug, Clone)]
pub enum DhtEvent {
    /// A node entered the routing table
    NodeAdded(Node),
    /// A node left the routing table
    NodeRemoved {
        /// Identifier of the removed node
        id: NodeId,
        /// Why it was removed
        reason: RemovalReason,
    },
    /// A gossip message arrived
    Broadcast {
        /// The gossiped message
        message: GossipMessage,
        /// The peer it arrived from
        from: Node,
    },
}
