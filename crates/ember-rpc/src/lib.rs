//! # ember-rpc
//!
//! The HTTP surface every Emberchain node exposes one port below its
//! overlay listener:
//!
//! - `POST /peer/<method>` — point-to-point peer RPC (magic-gated)
//! - `GET /api/peers` — up to 100 known peers
//! - `GET /api/peers/version` — version, build and network
//! - `POST /api/p2phelper` — echoes the caller's observed IP
//!   (self-IP discovery)

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod server;
mod types;

pub use error::{ApiError, ApiResult};
pub use server::{ApiConfig, PeerApiServer, MAX_PEERS_LISTED};
pub use types::{PeerDirectory, PeerDispatch, VersionInfo};
