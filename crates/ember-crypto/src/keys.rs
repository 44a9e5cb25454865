//! Ed25519 keypairs, signing and verification

use crate::error::CryptoError;
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An Ed25519 public key (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = slice
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("{} bytes", slice.len())))?;
        Ok(PublicKey(bytes))
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 signature (64 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Size in bytes
    pub const LEN: usize = 64;

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 64] = slice
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature(format!("{} bytes", slice.len())))?;
        Ok(Signature(bytes))
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 keypair
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Create from a hex-encoded 32-byte seed
    pub fn from_seed_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidSeed(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CryptoError::InvalidSeed(format!("{} bytes", b.len())))?;
        Ok(Self::from_seed(seed))
    }

    /// Public half of the keypair
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// Verify an Ed25519 signature over `message` with `public_key`.
///
/// Malformed keys or signatures verify as `false`; verification never
/// surfaces an error to the caller.
pub fn verify(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let sig = DalekSignature::from_bytes(&signature.0);
    vk.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keypair(n: u8) -> KeyPair {
        KeyPair::from_seed([n; 32])
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let kp = test_keypair(1);
        let msg = b"proposal digest";
        let sig = kp.sign(msg);
        assert!(verify(msg, &sig, &kp.public_key()));
    }

    #[test]
    fn test_verify_wrong_key() {
        let kp = test_keypair(1);
        let other = test_keypair(2);
        let sig = kp.sign(b"message");
        assert!(!verify(b"message", &sig, &other.public_key()));
    }

    #[test]
    fn test_verify_wrong_message() {
        let kp = test_keypair(1);
        let sig = kp.sign(b"message");
        assert!(!verify(b"another message", &sig, &kp.public_key()));
    }

    #[test]
    fn test_verify_tampered_signature() {
        let kp = test_keypair(1);
        let mut bytes = *kp.sign(b"message").as_bytes();
        bytes[0] ^= 0x01;
        let tampered = Signature::from_bytes(bytes);
        assert!(!verify(b"message", &tampered, &kp.public_key()));
    }

    #[test]
    fn test_deterministic_from_seed() {
        let a = test_keypair(7);
        let b = test_keypair(7);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"x").as_bytes(), b.sign(b"x").as_bytes());
    }

    #[test]
    fn test_from_seed_hex() {
        let kp = KeyPair::from_seed_hex(&"01".repeat(32)).unwrap();
        assert_eq!(kp.public_key(), test_keypair(1).public_key());
    }

    #[test]
    fn test_from_seed_hex_wrong_length() {
        assert!(matches!(
            KeyPair::from_seed_hex("0102"),
            Err(CryptoError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_public_key_hex_round_trip() {
        let pk = test_keypair(3).public_key();
        let parsed = PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, parsed);
    }

    #[test]
    fn test_public_key_serde() {
        let pk = test_keypair(4).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(pk, back);
    }

    #[test]
    fn test_signature_serde() {
        let sig = test_keypair(5).sign(b"payload");
        let json = serde_json::to_string(&sig).unwrap();
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, back);
    }

    #[test]
    fn test_verify_garbage_key_is_false() {
        // Not every 32-byte string is a valid curve point; verification must
        // normalize that to a rejection rather than an error.
        let kp = test_keypair(1);
        let sig = kp.sign(b"message");
        let garbage = PublicKey::from_bytes([0xFF; 32]);
        assert!(!verify(b"message", &sig, &garbage));
    }
}
