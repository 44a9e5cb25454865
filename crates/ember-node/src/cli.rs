//! CLI argument parsing for ember-node

use clap::Parser;
use std::path::PathBuf;

/// Emberchain delegated proof-of-stake node
#[derive(Parser, Debug, Clone)]
#[command(name = "emberchain")]
#[command(about = "Emberchain consensus node")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long)]
    pub datadir: Option<PathBuf>,

    /// Overlay UDP port (overrides the config file)
    #[arg(long)]
    pub peer_port: Option<u16>,

    /// Public IP to advertise (overrides the config file)
    #[arg(long)]
    pub public_ip: Option<String>,

    /// Bootstrap seeds, comma-separated `host:port` pairs (overrides the
    /// config file)
    #[arg(long, default_value = "")]
    pub seeds: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["emberchain"]);
        assert!(cli.config.is_none());
        assert!(cli.datadir.is_none());
        assert!(cli.peer_port.is_none());
        assert!(cli.seeds.is_empty());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_cli_custom_values() {
        let cli = Cli::parse_from([
            "emberchain",
            "--config", "/etc/ember/config.json",
            "--datadir", "/var/lib/ember",
            "--peer-port", "7100",
            "--public-ip", "203.0.113.7",
            "--seeds", "10.0.0.1:7000,10.0.0.2:7000",
            "--log-level", "debug",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ember/config.json")));
        assert_eq!(cli.datadir, Some(PathBuf::from("/var/lib/ember")));
        assert_eq!(cli.peer_port, Some(7100));
        assert_eq!(cli.public_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(cli.log_level, "debug");
    }
}
