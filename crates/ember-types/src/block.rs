//! Block header view

use ember_crypto::PublicKey;
use serde::{Deserialize, Serialize};

/// The slice of a block header the consensus core reads.
///
/// Block bodies, transactions and fork choice belong to the block module;
/// the core only ever needs the identity of a candidate block and the slot
/// its timestamp falls into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain height of the block
    pub height: u64,
    /// Block identifier (decimal integer or opaque string, per env flags)
    pub id: String,
    /// Epoch-relative timestamp in seconds
    pub timestamp: i32,
    /// Public key of the delegate that generated the block
    pub generator_public_key: PublicKey,
}

impl BlockHeader {
    /// Create a new header view
    pub fn new(height: u64, id: impl Into<String>, timestamp: i32, generator_public_key: PublicKey) -> Self {
        Self {
            height,
            id: id.into(),
            timestamp,
            generator_public_key,
        }
    }
}
