//! Configuration types for ember-node

use ember_consensus::SlotClock;
use ember_crypto::{KeyPair, PublicKey};
use ember_types::{EnvContext, Network};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors; fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read the config file
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Cannot parse the config file
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field has an invalid value
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A bootstrap seed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Seed host
    pub host: String,
    /// Seed overlay port
    pub port: u16,
}

/// Peer subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Bootstrap seeds
    pub list: Vec<SeedConfig>,
    /// Hosts whose packets are dropped
    pub black_list: Vec<String>,
    /// Persist the routing table across restarts
    pub persistent: bool,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            black_list: Vec::new(),
            persistent: true,
        }
    }
}

/// Slot timing and consensus parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotsConfig {
    /// Slot length in seconds
    pub interval: i32,
    /// Active delegate count
    pub delegates: u32,
    /// PoW difficulty width in bits
    pub leading: u8,
    /// Mining budget per proposal, in milliseconds
    pub pow_timeout_ms: u64,
    /// Chain epoch as a unix timestamp in seconds; consensus timestamps
    /// are relative to this
    pub epoch: i64,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            delegates: 101,
            leading: 2,
            pow_timeout_ms: 5_000,
            epoch: 1_640_995_200, // 2022-01-01T00:00:00Z
        }
    }
}

/// Forging configuration: the delegate secrets this node holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgingConfig {
    /// Hex-encoded 32-byte Ed25519 seeds
    pub secrets: Vec<String>,
}

/// Miner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Worker thread count; 0 picks the available parallelism
    pub workers: usize,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Public IP to advertise to peers
    pub public_ip: String,
    /// Overlay UDP port; the HTTP surface listens one port below
    pub peer_port: u16,
    /// Network magic; peers with a different magic are refused
    pub magic: String,
    /// Which network this node joins
    pub net: Network,
    /// Discover our public IP by asking a bootstrap peer
    pub acquireip: bool,
    /// Hash block ids as raw strings instead of decimal integers
    pub long_id: bool,
    /// Data directory
    pub data_dir: PathBuf,
    /// Active delegate ring, as hex public keys in ring order. When empty
    /// the ring is derived from the forging secrets.
    pub delegates: Vec<String>,
    /// Peer subsystem
    pub peers: PeersConfig,
    /// Slot timing
    pub slots: SlotsConfig,
    /// Forging secrets
    pub forging: ForgingConfig,
    /// Miner knobs
    pub miner: MinerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            public_ip: "127.0.0.1".to_string(),
            peer_port: 7000,
            magic: "594fe0f3".to_string(),
            net: Network::Testnet,
            acquireip: true,
            long_id: false,
            data_dir: PathBuf::from("./data"),
            delegates: Vec::new(),
            peers: PeersConfig::default(),
            slots: SlotsConfig::default(),
            forging: ForgingConfig::default(),
            miner: MinerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the node relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.magic.is_empty() {
            return Err(ConfigError::Invalid("magic must not be empty".into()));
        }
        if self.peer_port < 2 {
            return Err(ConfigError::Invalid(
                "peer_port must leave room for the HTTP listener one port below".into(),
            ));
        }
        if self.public_ip.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "public_ip is not an IPv4 address: {}",
                self.public_ip
            )));
        }
        if self.slots.interval < 1 {
            return Err(ConfigError::Invalid("slots.interval must be positive".into()));
        }
        if self.slots.delegates < 1 {
            return Err(ConfigError::Invalid("slots.delegates must be positive".into()));
        }
        if !(1..=16).contains(&self.slots.leading) {
            return Err(ConfigError::Invalid(
                "slots.leading must be between 1 and 16".into(),
            ));
        }
        self.delegate_ring()?;
        self.forging_keypairs()?;
        Ok(())
    }

    /// The slot clock described by this config
    pub fn slot_clock(&self) -> SlotClock {
        SlotClock::new(
            self.slots.interval,
            self.slots.delegates,
            self.slots.leading,
            Duration::from_millis(self.slots.pow_timeout_ms),
        )
    }

    /// The feature-flag snapshot for consensus operations
    pub fn env(&self) -> EnvContext {
        EnvContext {
            long_id: self.long_id,
        }
    }

    /// The advertised `ip:port` endpoint of this node
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.public_ip, self.peer_port)
    }

    /// Decode the forging secrets into keypairs
    pub fn forging_keypairs(&self) -> Result<Vec<KeyPair>, ConfigError> {
        self.forging
            .secrets
            .iter()
            .map(|secret| {
                KeyPair::from_seed_hex(secret)
                    .map_err(|e| ConfigError::Invalid(format!("forging secret: {}", e)))
            })
            .collect()
    }

    /// Decode the delegate ring; falls back to the forging keys when no
    /// explicit ring is configured.
    pub fn delegate_ring(&self) -> Result<Vec<PublicKey>, ConfigError> {
        if self.delegates.is_empty() {
            return Ok(self
                .forging_keypairs()?
                .iter()
                .map(KeyPair::public_key)
                .collect());
        }
        self.delegates
            .iter()
            .map(|key| {
                PublicKey::from_hex(key)
                    .map_err(|e| ConfigError::Invalid(format!("delegate key: {}", e)))
            })
            .collect()
    }
}
