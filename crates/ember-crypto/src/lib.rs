//! # ember-crypto
//!
//! Cryptographic primitives for Emberchain.
//!
//! - SHA-256 hashing (message digests, PoW preimages)
//! - RIPEMD-160 hashing (overlay node identifiers)
//! - Ed25519 signing/verification (proposals and votes)

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod keys;

pub use error::CryptoError;
pub use hash::{ripemd160, sha256};
pub use keys::{verify, KeyPair, PublicKey, Signature};
