//! API traits and response types

use async_trait::async_trait;
use ember_network::{DhtService, Node};
use ember_types::Network;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What `GET /api/peers/version` answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Semantic version of this node
    pub version: String,
    /// Build identifier
    pub build: String,
    /// Network this node participates in
    pub net: Network,
}

/// Source of known peers for `GET /api/peers`
pub trait PeerDirectory: Send + Sync {
    /// Up to `limit` known peers
    fn known_peers(&self, limit: usize) -> Vec<Node>;
}

impl PeerDirectory for DhtService {
    fn known_peers(&self, limit: usize) -> Vec<Node> {
        let mut nodes = self.table().read().all_nodes();
        nodes.truncate(limit);
        nodes
    }
}

/// Handler registry behind `POST /peer/<method>`.
///
/// The node supplies the implementation; unknown methods answer `None`
/// and the server turns that into a 404.
#[async_trait]
pub trait PeerDispatch: Send + Sync {
    /// Handle one peer RPC call
    async fn dispatch(&self, method: &str, params: Value) -> Option<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info_serde() {
        let info = VersionInfo {
            version: "1.3.1".to_string(),
            build: "2024-06-01".to_string(),
            net: Network::Mainnet,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["version"], "1.3.1");
        assert_eq!(json["net"], "mainnet");
    }
}
