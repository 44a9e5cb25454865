//! Codec error types

use thiserror::Error;

/// Error producing a deterministic hash serialization
#[derive(Debug, Error)]
pub enum CodecError {
    /// Block id is not a decimal integer (short-id mode only)
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),

    /// Address is not exactly `<ipv4>:<port>`
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
