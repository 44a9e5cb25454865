//! SHA-256 and RIPEMD-160 hashing

use ember_primitives::{Digest32, NodeId};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest32::from_bytes(hasher.finalize().into())
}

/// Compute the RIPEMD-160 hash of the input data.
///
/// Used to derive overlay node identifiers from `host:port` endpoints.
pub fn ripemd160(data: &[u8]) -> NodeId {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    NodeId::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== SHA-256 test vectors (FIPS 180-4) ====================

    #[test]
    fn test_sha256_empty() {
        let digest = sha256(&[]);
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_abc() {
        let digest = sha256(b"abc");
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_two_blocks() {
        let digest = sha256(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq");
        assert_eq!(
            digest.to_hex(),
            "248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1"
        );
    }

    #[test]
    fn test_sha256_deterministic() {
        let data = b"same input, same output";
        assert_eq!(sha256(data), sha256(data));
    }

    #[test]
    fn test_sha256_input_sensitivity() {
        let a = sha256(&[0x00]);
        let b = sha256(&[0x01]);
        assert_ne!(a, b);
    }

    // ==================== RIPEMD-160 test vectors (Dobbertin et al.) ====================

    #[test]
    fn test_ripemd160_empty() {
        let id = ripemd160(&[]);
        assert_eq!(id.to_hex(), "9c1185a5c5e9fc54612808977ee8f548b2258d31");
    }

    #[test]
    fn test_ripemd160_abc() {
        let id = ripemd160(b"abc");
        assert_eq!(id.to_hex(), "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc");
    }

    #[test]
    fn test_ripemd160_message_digest() {
        let id = ripemd160(b"message digest");
        assert_eq!(id.to_hex(), "5d0689ef49d2fae572b881b123a85ffa21595f36");
    }

    #[test]
    fn test_ripemd160_endpoint_style_input() {
        // Endpoint strings are the production input shape; distinct endpoints
        // must map to distinct ids.
        let a = ripemd160(b"192.168.0.1:7000");
        let b = ripemd160(b"192.168.0.1:7001");
        assert_ne!(a, b);
    }
}
