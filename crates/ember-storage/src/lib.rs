//! # ember-storage
//!
//! Persistent peer store for Emberchain, backed by RocksDB.
//!
//! The overlay flushes its routing table here periodically and replays the
//! stored records on startup, so a restarted node rejoins the network
//! without waiting for full bootstrap discovery.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod store;

pub use error::{StorageError, StorageResult};
pub use store::{NodeRecord, NodeStore, StoreConfig};
