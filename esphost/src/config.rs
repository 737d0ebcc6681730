//! # Driver Constants & Runtime Configuration
//!
//! Fixed properties of the ESP-Hosted link plus the few timings a board
//! integration may want to tune.

use serde::{Deserialize, Serialize};

/// Size of the station hardware address in bytes
pub const HWADDR_SIZE: usize = 6;

/// Preferred alignment of frame buffers handed to the co-processor
pub const BUFF_ALIGNMENT: usize = 4;

/// Maximum Transmission Unit of the Wi-Fi link
pub const WIFI_MTU_SIZE: usize = 1500;

/// Ethernet header carried in front of every frame (destination, source, type)
pub const ETH_HEADER_LEN: usize = 14;

/// Largest frame accepted from the co-processor
pub const MAX_FRAME_LEN: usize = WIFI_MTU_SIZE + ETH_HEADER_LEN;

/// Interface name reported to the host stack
pub const WIFI_IF_NAME: &str = "ESPHOST";

/// Period of the receive poll task
pub const RECEIVE_TASK_PERIOD_MS: u32 = 20;

/// How long the initialization handshake may take before giving up
pub const INIT_TIMEOUT_MS: u32 = 10_000;

/// Granularity of the initialization wait loop
pub const INIT_POLL_INTERVAL_MS: u32 = 100;

/// Upper bound on the number of access points returned by a scan
pub const MAX_AP_COUNT: usize = 10;

/// Longest SSID accepted by the co-processor
pub const SSID_MAX_LEN: usize = 32;

/// Longest WPA passphrase accepted by the co-processor
pub const PASSPHRASE_MAX_LEN: usize = 63;

/// Configuration for the link device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmacConfig {
    /// Period of the receive poll task in milliseconds
    pub receive_period_ms: u32,
}

impl Default for EmacConfig {
    fn default() -> Self {
        Self {
            receive_period_ms: RECEIVE_TASK_PERIOD_MS,
        }
    }
}

/// Configuration for the station interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StationConfig {
    /// Deadline for the hardware initialization handshake in milliseconds
    pub init_timeout_ms: u32,
    /// Delay between protocol pumps while waiting for initialization
    pub init_poll_interval_ms: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: INIT_TIMEOUT_MS,
            init_poll_interval_ms: INIT_POLL_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_config_default() {
        let config = StationConfig::default();
        assert_eq!(config.init_timeout_ms, 10_000);
        assert_eq!(config.init_poll_interval_ms, 100);
    }

    #[test]
    fn test_emac_config_default() {
        assert_eq!(EmacConfig::default().receive_period_ms, 20);
    }

    #[test]
    fn test_interface_name_fits_ifname_field() {
        assert!(WIFI_IF_NAME.len() < 16);
        assert!(WIFI_IF_NAME.is_ascii());
    }
}
