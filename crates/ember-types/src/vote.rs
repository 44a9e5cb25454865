//! Vote wire types

use ember_crypto::{PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// One delegate's signature over a `(height, id)` vote digest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoteItem {
    /// Signer public key
    pub key: PublicKey,
    /// Ed25519 signature over the vote digest
    pub signature: Signature,
}

/// A bundle of delegate signatures endorsing one `(height, id)` block.
///
/// A vote travels with one or more signature items; the aggregator merges
/// incoming bundles into the pending accumulator, keeping signer keys
/// unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Height of the endorsed block
    pub height: u64,
    /// Identifier of the endorsed block
    pub id: String,
    /// Epoch-relative timestamp of the endorsed block, in seconds
    pub timestamp: i32,
    /// Collected signatures, unique by signer key
    pub signatures: Vec<VoteItem>,
}

impl Vote {
    /// Create an empty vote bundle for a block
    pub fn new(height: u64, id: impl Into<String>, timestamp: i32) -> Self {
        Self {
            height,
            id: id.into(),
            timestamp,
            signatures: Vec::new(),
        }
    }

    /// Whether the bundle endorses the given block
    pub fn endorses(&self, height: u64, id: &str) -> bool {
        self.height == height && self.id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let vote = Vote::new(10, "A", 500);
        assert!(vote.signatures.is_empty());
        assert_eq!(vote.height, 10);
    }

    #[test]
    fn test_endorses() {
        let vote = Vote::new(10, "A", 500);
        assert!(vote.endorses(10, "A"));
        assert!(!vote.endorses(10, "B"));
        assert!(!vote.endorses(11, "A"));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut vote = Vote::new(10, "A", 500);
        vote.signatures.push(VoteItem {
            key: PublicKey::from_bytes([1; 32]),
            signature: Signature::from_bytes([2; 64]),
        });
        let json = serde_json::to_string(&vote).unwrap();
        let back: Vote = serde_json::from_str(&json).unwrap();
        assert_eq!(vote, back);
    }
}
