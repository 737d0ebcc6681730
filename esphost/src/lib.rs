//! # ESPHost Network Interface Library
//!
//! Exposes an ESP32 Wi-Fi co-processor, driven through the ESP-Hosted control
//! library over SPI, as a network interface to a host microcontroller's IP
//! stack:
//!
//! - **Link device**: [`EspHostEmac`], the Ethernet-MAC equivalent
//!   (MTU, hardware address, frame transmit and periodic receive)
//! - **Station interface**: [`EspHostInterface`], connect/disconnect,
//!   credentials, signal strength and scanning
//! - **Co-processor handle**: [`EspHost`], one lock around the control
//!   service plus the hardware initialization state
//!
//! ## Architecture
//!
//! ```text
//!  application ──► EspHostInterface ──► NetworkStack (host IP stack)
//!                        │                    │
//!                        │              EspHostEmac ◄── EventQueue (20 ms poll)
//!                        │                    │
//!                        └──────► EspHost ◄───┘
//!                                    │
//!                              ControlService ──SPI──► ESP32
//! ```
//!
//! The control library, the host buffer pool, the task runner and the IP stack
//! are all consumed through the traits in [`traits`] and [`control`], so the
//! whole driver can be exercised off-target.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[cfg(any(feature = "alloc", test))]
extern crate alloc;

pub mod config;
pub mod control;
pub mod emac;
pub mod error;
pub mod interface;
pub mod mac;
pub mod security;
pub mod traits;

#[cfg(any(feature = "alloc", test))]
pub mod buffer;

#[cfg(test)]
mod mock;

// Re-export main types for convenience
#[cfg(any(feature = "alloc", test))]
pub use buffer::{HeapBuffer, HeapMemoryManager, PoolStats};
pub use config::{EmacConfig, StationConfig};
pub use control::{
    AccessPointConfig, AccessPointInfo, ControlService, EspHost, InitSignal, InitState, Interface,
};
pub use emac::{EmacStats, EspHostEmac};
pub use error::{ControlError, NetError};
pub use interface::{ConnectionState, EspHostInterface};
pub use mac::{parse_mac, MacAddress, MacString};
pub use security::{EncryptionMode, Security};
pub use traits::{
    CallbackToken, Emac, EventQueue, LinkInputCb, LinkStateCb, MemoryManager, NetworkStack,
    PeriodicTask, WifiAccessPoint, WifiInterface,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
