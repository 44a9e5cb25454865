//! Consensus error types

use ember_types::CodecError;
use thiserror::Error;

/// Errors from the PoW oracle
#[derive(Debug, Error)]
pub enum MinerError {
    /// No solution found before the wall-clock deadline
    #[error("mining timed out")]
    Timeout,

    /// A mining worker failed
    #[error("mining worker failed: {0}")]
    Worker(String),
}

/// Result type for mining operations
pub type MinerResult<T> = Result<T, MinerError>;

/// Consensus errors
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Proof-of-work verification failed
    #[error("invalid proof of work")]
    PowInvalid,

    /// Proposal signature verification failed
    #[error("invalid proposal signature")]
    SignatureInvalid,

    /// Generator key has no position in the active delegate ring
    #[error("delegate index lookup failed")]
    IndexLookupFailed,

    /// Signing key does not match the block generator
    #[error("keypair does not match block generator")]
    KeyMismatch,

    /// Proposal belongs to a different slot than the current one
    #[error("stale proposal: slot {got}, current {current}")]
    StalePropose {
        /// Slot the proposal's timestamp falls into
        got: u64,
        /// Slot the local clock is in
        current: u64,
    },

    /// Vote received while no block is pending
    #[error("no pending block")]
    UnknownPending,

    /// The PoW oracle failed
    #[error(transparent)]
    Miner(#[from] MinerError),

    /// Hash serialization failed
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
