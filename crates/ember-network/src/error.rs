//! Network error types

use thiserror::Error;

/// Overlay errors
#[derive(Debug, Error)]
pub enum DhtError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet (de)serialization failed
    #[error("encode error: {0}")]
    Encode(String),

    /// Service already started
    #[error("overlay service already running")]
    AlreadyRunning,

    /// Event channel closed
    #[error("event channel closed")]
    ChannelClosed,
}

/// Result type for overlay operations
pub type DhtResult<T> = Result<T, DhtError>;

/// Peer RPC failures
#[derive(Debug, Error)]
pub enum PeerRpcError {
    /// The request timed out
    #[error("peer request timed out")]
    Timeout,

    /// The peer answered with a non-2xx status
    #[error("peer answered with status {0}")]
    Http(u16),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// No candidate peers to pick from
    #[error("no peers available")]
    NoPeers,

    /// The contact's port has no RPC listener below it
    #[error("contact port {0} has no peer-RPC port")]
    InvalidPort(u16),
}

/// Result type for peer RPC operations
pub type PeerRpcResult<T> = Result<T, PeerRpcError>;
