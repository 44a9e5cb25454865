//! Point-to-point peer RPC client.
//!
//! The peer-RPC listener sits one port below the overlay listener on every
//! node; that offset is contractual across the network.

use crate::error::{PeerRpcError, PeerRpcResult};
use crate::types::Node;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Response cap for [`PeerClient::random_request`], independent of the
/// per-request HTTP timeout
pub const RANDOM_REQUEST_CAP: Duration = Duration::from_secs(4);

/// Client configuration
#[derive(Debug, Clone)]
pub struct PeerClientConfig {
    /// Network magic sent with every request
    pub magic: String,
    /// Our semantic version sent with every request
    pub version: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl Default for PeerClientConfig {
    fn default() -> Self {
        Self {
            magic: String::new(),
            version: "0.0.0".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the `/peer/<method>` surface of other nodes
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    config: PeerClientConfig,
}

impl PeerClient {
    /// Build a client with the given identity headers and timeout
    pub fn new(config: PeerClientConfig) -> PeerRpcResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PeerRpcError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// POST `params` to `http://{host}:{port-1}/peer/{method}` on the
    /// contact, with `magic` and `version` headers.
    pub async fn request(
        &self,
        method: &str,
        params: &Value,
        contact: &Node,
    ) -> PeerRpcResult<Value> {
        let rpc_port = contact
            .port
            .checked_sub(1)
            .ok_or(PeerRpcError::InvalidPort(contact.port))?;
        let url = format!("http://{}:{}/peer/{}", contact.host, rpc_port, method);
        debug!(%url, "peer request");

        let response = self
            .http
            .post(&url)
            .header("magic", &self.config.magic)
            .header("version", &self.config.version)
            .json(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PeerRpcError::Timeout
                } else {
                    PeerRpcError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerRpcError::Http(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| PeerRpcError::Transport(e.to_string()))
    }

    /// Ask a contact's `/api/p2phelper` endpoint what IP it observes us
    /// as. Used for self-IP discovery against the bootstrap set.
    pub async fn p2p_helper(&self, contact: &Node) -> PeerRpcResult<String> {
        let rpc_port = contact
            .port
            .checked_sub(1)
            .ok_or(PeerRpcError::InvalidPort(contact.port))?;
        let url = format!("http://{}:{}/api/p2phelper", contact.host, rpc_port);

        let response = self
            .http
            .post(&url)
            .header("magic", &self.config.magic)
            .header("version", &self.config.version)
            .json(&Value::Null)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PeerRpcError::Timeout
                } else {
                    PeerRpcError::Transport(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PeerRpcError::Http(status.as_u16()));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| PeerRpcError::Transport(e.to_string()))?;
        value["ip"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PeerRpcError::Transport("missing ip field".to_string()))
    }

    /// Issue [`request`](Self::request) to one randomly chosen candidate,
    /// capped at [`RANDOM_REQUEST_CAP`] regardless of the HTTP timeout.
    /// Returns the response and the chosen peer.
    pub async fn random_request(
        &self,
        method: &str,
        params: &Value,
        candidates: &[Node],
    ) -> PeerRpcResult<(Value, Node)> {
        let contact = candidates
            .choose(&mut rand::thread_rng())
            .ok_or(PeerRpcError::NoPeers)?;
        let result = tokio::time::timeout(
            RANDOM_REQUEST_CAP,
            self.request(method, params, contact),
        )
        .await
        .map_err(|_| PeerRpcError::Timeout)??;
        Ok((result, contact.clone()))
    }
}
