//! Per-round environment context

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which network the node participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network
    Mainnet,
    /// Test network
    Testnet,
}

impl Network {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Testnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the process-wide feature flags, taken once per consensus
/// operation.
///
/// The codec reads the flags only through a snapshot so that two rounds
/// running in parallel cannot observe a flag flip mid-operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnvContext {
    /// When set, block ids hash as raw UTF-8 strings; otherwise they are
    /// parsed as decimal integers and hashed as 8 big-endian bytes.
    pub long_id: bool,
}

impl EnvContext {
    /// Context with long string ids enabled
    pub fn with_long_id() -> Self {
        Self { long_id: true }
    }
}
