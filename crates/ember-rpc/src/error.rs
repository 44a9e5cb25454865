//! API server error types

use thiserror::Error;

/// API server errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Could not bind the listen address
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),

    /// The server loop failed
    #[error("serve error: {0}")]
    Serve(String),
}

/// Result type for API server operations
pub type ApiResult<T> = Result<T, ApiError>;
