//! Block proposal wire type

use ember_crypto::{PublicKey, Signature};
use ember_primitives::Digest32;
use serde::{Deserialize, Serialize};

/// A signed announcement by the elected delegate that it intends to extend
/// the chain with a specific block, bound to its network address by a
/// masked-hash Proof-of-Work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Propose {
    /// Height of the proposed block
    pub height: u64,
    /// Identifier of the proposed block
    pub id: String,
    /// Epoch-relative timestamp of the proposed block, in seconds
    pub timestamp: i32,
    /// Public key of the proposing delegate
    pub generator_public_key: PublicKey,
    /// Proposer endpoint as `ip:port`; part of the PoW preimage
    pub address: String,
    /// PoW-masked digest the nonce was mined against
    pub hash: Digest32,
    /// Nonce solving the PoW puzzle
    pub nonce: u64,
    /// Ed25519 signature over the 32 raw bytes of `hash`
    pub signature: Signature,
}

impl Propose {
    /// Content identity used for gossip deduplication
    pub fn identity(&self) -> (u64, &str) {
        (self.height, self.id.as_str())
    }
}
