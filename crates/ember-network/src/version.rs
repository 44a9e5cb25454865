//! Peer version compatibility

use ember_types::Network;

/// Minimum compatible peer version on mainnet
const MIN_VERSION_MAINNET: [u32; 3] = [1, 3, 1];

/// Minimum compatible peer version on testnet
const MIN_VERSION_TESTNET: [u32; 3] = [1, 2, 3];

/// Whether a peer's semantic version is compatible with the given network.
///
/// Triplets compare lexicographically against the per-net minimum;
/// anything that is not an `a.b.c` triplet is accepted.
pub fn is_compatible(version: &str, net: Network) -> bool {
    let Some(parts) = parse_triplet(version) else {
        return true;
    };
    let min = match net {
        Network::Mainnet => MIN_VERSION_MAINNET,
        Network::Testnet => MIN_VERSION_TESTNET,
    };
    parts >= min
}

fn parse_triplet(version: &str) -> Option<[u32; 3]> {
    let mut parts = version.trim().split('.');
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    let c = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some([a, b, c])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_minimum() {
        assert!(is_compatible("1.3.1", Network::Mainnet));
        assert!(is_compatible("1.3.2", Network::Mainnet));
        assert!(is_compatible("1.4.0", Network::Mainnet));
        assert!(is_compatible("2.0.0", Network::Mainnet));
        assert!(!is_compatible("1.3.0", Network::Mainnet));
        assert!(!is_compatible("1.2.9", Network::Mainnet));
        assert!(!is_compatible("0.9.9", Network::Mainnet));
    }

    #[test]
    fn test_testnet_minimum() {
        assert!(is_compatible("1.2.3", Network::Testnet));
        assert!(is_compatible("1.3.0", Network::Testnet));
        assert!(!is_compatible("1.2.2", Network::Testnet));
    }

    #[test]
    fn test_lexicographic_not_numeric_strings() {
        // Component comparison, not string comparison: 1.10.0 > 1.3.1
        assert!(is_compatible("1.10.0", Network::Mainnet));
    }

    #[test]
    fn test_non_triplets_accepted() {
        assert!(is_compatible("", Network::Mainnet));
        assert!(is_compatible("dev", Network::Mainnet));
        assert!(is_compatible("1.3", Network::Mainnet));
        assert!(is_compatible("1.3.1.4", Network::Mainnet));
        assert!(is_compatible("v1.0.0", Network::Mainnet));
    }
}
