//! 160-bit overlay node identifier

use crate::error::PrimitiveError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 160-bit node identifier (20 bytes, the output size of RIPEMD-160).
///
/// Identifiers live in a Kademlia-style XOR metric space: the distance
/// between two ids is their bytewise XOR, and `bucket_index` maps a peer to
/// the routing bucket shared by all ids at the same distance magnitude.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeId([u8; 20]);

impl NodeId {
    /// Size in bytes
    pub const LEN: usize = 20;

    /// Number of distance buckets (one per bit)
    pub const BITS: usize = 160;

    /// Zero id
    pub const ZERO: NodeId = NodeId([0u8; 20]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        NodeId(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, PrimitiveError> {
        if slice.len() != Self::LEN {
            return Err(PrimitiveError::InvalidLength {
                expected: Self::LEN,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(NodeId(bytes))
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| PrimitiveError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to lowercase hex string (no prefix)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// XOR distance to another id
    pub fn distance(&self, other: &NodeId) -> [u8; 20] {
        let mut out = [0u8; 20];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Index of the routing bucket `other` falls into, relative to `self`.
    ///
    /// The index is `159 - leading_zero_bits(distance)`, so the furthest
    /// half of the id space lands in bucket 159. Returns `None` for the
    /// id itself (distance zero has no bucket).
    pub fn bucket_index(&self, other: &NodeId) -> Option<usize> {
        let dist = self.distance(other);
        for (i, byte) in dist.iter().enumerate() {
            if *byte != 0 {
                let bit = 7 - byte.leading_zeros() as usize;
                return Some((Self::LEN - 1 - i) * 8 + bit);
            }
        }
        None
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 20]> for NodeId {
    fn from(bytes: [u8; 20]) -> Self {
        NodeId(bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let bytes = [7u8; 20];
        let id = NodeId::from_bytes(bytes);
        assert_eq!(*id.as_bytes(), bytes);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        let result = NodeId::from_slice(&[0u8; 19]);
        assert!(matches!(
            result,
            Err(PrimitiveError::InvalidLength { expected: 20, got: 19 })
        ));
    }

    #[test]
    fn test_distance_symmetric() {
        let a = NodeId::from_bytes([0x0F; 20]);
        let b = NodeId::from_bytes([0xF0; 20]);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&b), [0xFF; 20]);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = NodeId::from_bytes([0x55; 20]);
        assert_eq!(a.distance(&a), [0u8; 20]);
    }

    #[test]
    fn test_bucket_index_self_is_none() {
        let a = NodeId::from_bytes([0x55; 20]);
        assert!(a.bucket_index(&a).is_none());
    }

    #[test]
    fn test_bucket_index_extremes() {
        let zero = NodeId::ZERO;

        // Distance with only the lowest bit set -> bucket 0
        let mut low = [0u8; 20];
        low[19] = 0x01;
        assert_eq!(zero.bucket_index(&NodeId::from_bytes(low)), Some(0));

        // Distance with the highest bit set -> bucket 159
        let mut high = [0u8; 20];
        high[0] = 0x80;
        assert_eq!(zero.bucket_index(&NodeId::from_bytes(high)), Some(159));
    }

    #[test]
    fn test_bucket_index_mid_byte() {
        let zero = NodeId::ZERO;
        let mut d = [0u8; 20];
        d[18] = 0x10; // bit 4 of the second-lowest byte -> bucket 12
        assert_eq!(zero.bucket_index(&NodeId::from_bytes(d)), Some(12));
    }

    #[test]
    fn test_hex_round_trip() {
        let id = NodeId::from_bytes([0xCD; 20]);
        let parsed = NodeId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_serde_hex_string() {
        let id = NodeId::from_bytes([0x11; 20]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(20)));

        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
