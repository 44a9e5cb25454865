//! Delegate ring and index lookup

use ember_crypto::PublicKey;
use std::collections::HashMap;

/// Position lookup into the active delegate ring.
///
/// The ring order is consensus-critical: a delegate's position selects both
/// its proposal slot and its PoW difficulty pattern.
pub trait DelegateRegistry: Send + Sync {
    /// Position of a delegate in the ring, if it is active
    fn index_of(&self, key: &PublicKey) -> Option<u32>;

    /// The delegate elected for a slot (round-robin over the ring)
    fn delegate_for_slot(&self, slot: u64) -> Option<PublicKey>;

    /// Number of active delegates
    fn len(&self) -> usize;

    /// Whether the ring is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a key is in the active ring
    fn contains(&self, key: &PublicKey) -> bool {
        self.index_of(key).is_some()
    }
}

/// A fixed delegate ring, ordered as configured
#[derive(Debug, Clone, Default)]
pub struct StaticDelegates {
    ring: Vec<PublicKey>,
    positions: HashMap<PublicKey, u32>,
}

impl StaticDelegates {
    /// Build from an ordered ring of delegate keys. Duplicates keep their
    /// first position.
    pub fn from_ring(ring: Vec<PublicKey>) -> Self {
        let mut positions = HashMap::with_capacity(ring.len());
        for (i, key) in ring.iter().enumerate() {
            positions.entry(*key).or_insert(i as u32);
        }
        Self { ring, positions }
    }

    /// The configured ring order
    pub fn ring(&self) -> &[PublicKey] {
        &self.ring
    }
}

impl DelegateRegistry for StaticDelegates {
    fn index_of(&self, key: &PublicKey) -> Option<u32> {
        self.positions.get(key).copied()
    }

    fn delegate_for_slot(&self, slot: u64) -> Option<PublicKey> {
        if self.ring.is_empty() {
            return None;
        }
        let pos = (slot % self.ring.len() as u64) as usize;
        self.ring.get(pos).copied()
    }

    fn len(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> PublicKey {
        PublicKey::from_bytes([n; 32])
    }

    #[test]
    fn test_index_of() {
        let delegates = StaticDelegates::from_ring(vec![key(1), key(2), key(3)]);
        assert_eq!(delegates.index_of(&key(1)), Some(0));
        assert_eq!(delegates.index_of(&key(3)), Some(2));
        assert_eq!(delegates.index_of(&key(9)), None);
    }

    #[test]
    fn test_delegate_for_slot_round_robin() {
        let delegates = StaticDelegates::from_ring(vec![key(1), key(2), key(3)]);
        assert_eq!(delegates.delegate_for_slot(0), Some(key(1)));
        assert_eq!(delegates.delegate_for_slot(1), Some(key(2)));
        assert_eq!(delegates.delegate_for_slot(3), Some(key(1)));
        assert_eq!(delegates.delegate_for_slot(100), Some(key(2)));
    }

    #[test]
    fn test_empty_ring() {
        let delegates = StaticDelegates::default();
        assert!(delegates.is_empty());
        assert_eq!(delegates.delegate_for_slot(0), None);
    }

    #[test]
    fn test_duplicate_keys_keep_first_position() {
        let delegates = StaticDelegates::from_ring(vec![key(1), key(1), key(2)]);
        assert_eq!(delegates.index_of(&key(1)), Some(0));
        assert_eq!(delegates.len(), 3);
    }

    #[test]
    fn test_contains() {
        let delegates = StaticDelegates::from_ring(vec![key(1)]);
        assert!(delegates.contains(&key(1)));
        assert!(!delegates.contains(&key(2)));
    }
}
