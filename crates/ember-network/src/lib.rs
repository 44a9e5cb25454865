//! # ember-network
//!
//! The P2P dissemination substrate of Emberchain.
//!
//! This crate provides:
//! - A Kademlia-style routing table keyed by 160-bit node ids
//! - The UDP overlay service: bootstrap, peer persistence, bucket refresh,
//!   seed reconnect, blacklist filtering
//! - Topic-based gossip with random-peer fan-out
//! - A point-to-point HTTP peer RPC client
//! - Peer version compatibility gating

#![warn(missing_docs)]
#![warn(clippy::all)]

mod dht;
mod error;
mod gossip;
mod rpc;
mod table;
mod types;
mod version;

pub use dht::{
    DhtConfig, DhtService, CHECK_BUCKET_OUTDATE, RECONNECT_SEED_INTERVAL, SAVE_PEERS_INTERVAL,
};
pub use error::{DhtError, DhtResult, PeerRpcError, PeerRpcResult};
pub use gossip::{topic, GossipService, TopicRegistry, GOSSIP_FANOUT};
pub use rpc::{PeerClient, PeerClientConfig, RANDOM_REQUEST_CAP};
pub use table::{InsertOutcome, RoutingTable, BUCKET_SIZE};
pub use types::{unix_millis, DhtEvent, GossipMessage, Node, Packet, RemovalReason};
pub use version::is_compatible;
