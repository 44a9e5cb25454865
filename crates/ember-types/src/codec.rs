//! Deterministic byte serializations for vote and proposal digests.
//!
//! Both serializations are big-endian and must be byte-identical across
//! implementations: the SHA-256 of these buffers is what delegates sign and
//! what the PoW puzzle is keyed to.

use crate::env::EnvContext;
use crate::error::{CodecError, CodecResult};
use ember_crypto::{sha256, PublicKey};
use ember_primitives::Digest32;
use std::net::Ipv4Addr;

/// Serialize `(height, id)` for vote hashing.
///
/// Layout: height as 8-byte signed big-endian, then the block id — raw
/// UTF-8 bytes in long-id mode, or the id parsed as a decimal integer and
/// written as 8 big-endian bytes in short-id mode.
pub fn vote_hash_bytes(height: u64, id: &str, env: &EnvContext) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&(height as i64).to_be_bytes());
    write_block_id(&mut buf, id, env)?;
    Ok(buf)
}

/// SHA-256 of [`vote_hash_bytes`]: the 32-byte digest delegates sign when
/// voting for a block.
pub fn vote_digest(height: u64, id: &str, env: &EnvContext) -> CodecResult<Digest32> {
    Ok(sha256(&vote_hash_bytes(height, id, env)?))
}

/// Serialize a proposal for hashing.
///
/// Layout: height (8B BE signed), block id (as in [`vote_hash_bytes`]),
/// generator public key (32 raw bytes), timestamp (4B BE signed), the
/// IPv4 address as a 32-bit big-endian integer, and the port as 4 bytes
/// big-endian.
pub fn propose_hash_bytes(
    height: u64,
    id: &str,
    generator_public_key: &PublicKey,
    timestamp: i32,
    address: &str,
    env: &EnvContext,
) -> CodecResult<Vec<u8>> {
    let (ip, port) = parse_endpoint(address)?;
    let mut buf = Vec::with_capacity(60);
    buf.extend_from_slice(&(height as i64).to_be_bytes());
    write_block_id(&mut buf, id, env)?;
    buf.extend_from_slice(generator_public_key.as_bytes());
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&u32::from(ip).to_be_bytes());
    buf.extend_from_slice(&(port as u32).to_be_bytes());
    Ok(buf)
}

/// SHA-256 of [`propose_hash_bytes`]: the pre-PoW digest of a proposal.
pub fn propose_digest(
    height: u64,
    id: &str,
    generator_public_key: &PublicKey,
    timestamp: i32,
    address: &str,
    env: &EnvContext,
) -> CodecResult<Digest32> {
    Ok(sha256(&propose_hash_bytes(
        height,
        id,
        generator_public_key,
        timestamp,
        address,
        env,
    )?))
}

/// Parse an `<ipv4>:<port>` endpoint. Hostnames, IPv6 and trailing garbage
/// are rejected.
pub fn parse_endpoint(address: &str) -> CodecResult<(Ipv4Addr, u16)> {
    let invalid = || CodecError::InvalidEndpoint(address.to_string());
    let (host, port) = address.split_once(':').ok_or_else(invalid)?;
    if port.contains(':') {
        return Err(invalid());
    }
    let ip: Ipv4Addr = host.parse().map_err(|_| invalid())?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok((ip, port))
}

fn write_block_id(buf: &mut Vec<u8>, id: &str, env: &EnvContext) -> CodecResult<()> {
    if env.long_id {
        buf.extend_from_slice(id.as_bytes());
    } else {
        let numeric: u64 = id
            .parse()
            .map_err(|_| CodecError::InvalidBlockId(id.to_string()))?;
        buf.extend_from_slice(&numeric.to_be_bytes());
    }
    Ok(())
}
