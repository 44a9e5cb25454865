//! # ember-primitives
//!
//! Core fixed-size byte types for Emberchain:
//! - `Digest32`: a 32-byte SHA-256 output
//! - `NodeId`: a 160-bit overlay identifier with an XOR distance metric
//!
//! Both types serialize as lowercase hex strings, matching the JSON wire
//! format used across the peer protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod digest;
mod error;
mod node_id;

pub use digest::Digest32;
pub use error::PrimitiveError;
pub use node_id::NodeId;
