//! Uplink discovery and role selection
//!
//! A relay decides once per session where its uplink goes:
//!
//! 1. If the Root network is visible, join it directly, whatever its signal.
//! 2. Otherwise join the strongest visible Relay network.
//! 3. If neither is visible there is nothing to relay to and the session ends.
//!
//! Relay candidates are walked from the last scan entry to the first and a
//! candidate replaces the current winner only when its signal is strictly
//! greater. With equal signals the entry with the higher scan index wins,
//! because it is seen first and never overwritten.

use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::traits::ScannedNetwork;

/// Relay network considered during discovery
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborCandidate {
    /// Network name
    pub name: String,
    /// Signal strength in dBm
    pub signal_strength: i32,
    /// Position in the scan result
    pub scan_index: usize,
}

/// Outcome of discovery
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkDecision {
    /// The Root network is visible; join it directly
    ConnectAsRootClient,
    /// Join the selected Relay network
    ConnectViaRelay(NeighborCandidate),
    /// No uplink of any kind is visible
    NoUplinkFound,
}

impl UplinkDecision {
    /// Network name to join, if any
    pub fn target_name<'a>(&'a self, config: &'a RelayConfig) -> Option<&'a str> {
        match self {
            UplinkDecision::ConnectAsRootClient => Some(config.root_identity.as_str()),
            UplinkDecision::ConnectViaRelay(candidate) => Some(candidate.name.as_str()),
            UplinkDecision::NoUplinkFound => None,
        }
    }
}

/// Choose an uplink from one scan result
pub fn select_uplink(networks: &[ScannedNetwork], config: &RelayConfig) -> UplinkDecision {
    if networks.iter().any(|n| n.name == config.root_identity) {
        info!(root = %config.root_identity, "Root network visible");
        return UplinkDecision::ConnectAsRootClient;
    }

    let mut best: Option<NeighborCandidate> = None;
    for (index, network) in networks.iter().enumerate().rev() {
        if network.name != config.relay_identity {
            continue;
        }
        debug!(index, rssi = network.signal_strength, "Relay candidate");
        let better = best
            .as_ref()
            .map(|b| network.signal_strength > b.signal_strength)
            .unwrap_or(true);
        if better {
            best = Some(NeighborCandidate {
                name: network.name.clone(),
                signal_strength: network.signal_strength,
                scan_index: index,
            });
        }
    }

    match best {
        Some(candidate) => {
            info!(
                index = candidate.scan_index,
                rssi = candidate.signal_strength,
                "Selected relay uplink"
            );
            UplinkDecision::ConnectViaRelay(candidate)
        }
        None => {
            info!(networks = networks.len(), "No uplink network visible");
            UplinkDecision::NoUplinkFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig::default().with_identities("ROOT", "RELAY")
    }

    #[test]
    fn test_root_wins_regardless_of_signal() {
        let scan = vec![
            ScannedNetwork::new("RELAY", -30),
            ScannedNetwork::new("ROOT", -95),
            ScannedNetwork::new("RELAY", -40),
        ];
        assert_eq!(select_uplink(&scan, &config()), UplinkDecision::ConnectAsRootClient);
    }

    #[test]
    fn test_strongest_relay_selected() {
        let scan = vec![
            ScannedNetwork::new("RELAY", -80),
            ScannedNetwork::new("OTHER", -20),
            ScannedNetwork::new("RELAY", -45),
            ScannedNetwork::new("RELAY", -70),
        ];
        match select_uplink(&scan, &config()) {
            UplinkDecision::ConnectViaRelay(c) => {
                assert_eq!(c.signal_strength, -45);
                assert_eq!(c.scan_index, 2);
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_tie_keeps_highest_scan_index() {
        let scan = vec![
            ScannedNetwork::new("RELAY", -60),
            ScannedNetwork::new("RELAY", -60),
            ScannedNetwork::new("RELAY", -60),
        ];
        match select_uplink(&scan, &config()) {
            UplinkDecision::ConnectViaRelay(c) => assert_eq!(c.scan_index, 2),
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_nothing_visible() {
        let scan = vec![ScannedNetwork::new("CoffeeShop", -30)];
        assert_eq!(select_uplink(&scan, &config()), UplinkDecision::NoUplinkFound);
        assert_eq!(select_uplink(&[], &config()), UplinkDecision::NoUplinkFound);
    }

    #[test]
    fn test_name_match_is_exact() {
        let scan = vec![
            ScannedNetwork::new("ROOT2", -30),
            ScannedNetwork::new("relay", -30),
        ];
        assert_eq!(select_uplink(&scan, &config()), UplinkDecision::NoUplinkFound);
    }

    #[test]
    fn test_target_name() {
        let cfg = config();
        assert_eq!(UplinkDecision::ConnectAsRootClient.target_name(&cfg), Some("ROOT"));
        assert_eq!(UplinkDecision::NoUplinkFound.target_name(&cfg), None);
    }
}
