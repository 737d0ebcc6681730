//! # ESPHost Wi-Fi Station Interface
//!
//! [`EspHostInterface`] drives the station lifecycle on top of an
//! [`EspHostEmac`]: credentials, association with an access point, bringing
//! the host IP interface up and down, signal strength and scanning.
//!
//! ## Connection State
//!
//! ```text
//!           connect()                     bring_up ok
//!   Idle ─────────────► Initializing ───► ... ───► Connected
//!    ▲   (first call only)                              │
//!    └──────────────────── disconnect() ────────────────┘
//! ```
//!
//! A failed connect always leaves the interface `Idle`; nothing is retried
//! automatically.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, info, warn};

use crate::config::{StationConfig, HWADDR_SIZE, MAX_AP_COUNT};
use crate::control::{AccessPointConfig, AccessPointInfo, ControlService};
use crate::emac::EspHostEmac;
use crate::error::NetError;
use crate::mac::{parse_mac, MacAddress};
use crate::security::Security;
use crate::traits::{Emac, EventQueue, MemoryManager, NetworkStack, WifiAccessPoint, WifiInterface};

/// Station connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Idle,
    /// Waiting for the co-processor to finish its initialization handshake
    Initializing,
    Connected,
}

/// Wi-Fi station backed by an ESP-Hosted co-processor
pub struct EspHostInterface<M, C, Q, P, S, D>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
    S: NetworkStack<EspHostEmac<M, C, Q, P>>,
    D: DelayNs,
{
    emac: &'static EspHostEmac<M, C, Q, P>,
    stack: S,
    delay: D,
    config: StationConfig,
    ap: AccessPointConfig,
    associated: Option<AccessPointInfo>,
    state: ConnectionState,
}

impl<M, C, Q, P, S, D> EspHostInterface<M, C, Q, P, S, D>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
    S: NetworkStack<EspHostEmac<M, C, Q, P>>,
    D: DelayNs,
{
    pub fn new(emac: &'static EspHostEmac<M, C, Q, P>, stack: S, delay: D) -> Self {
        Self::with_config(emac, stack, delay, StationConfig::default())
    }

    pub fn with_config(
        emac: &'static EspHostEmac<M, C, Q, P>,
        stack: S,
        delay: D,
        config: StationConfig,
    ) -> Self {
        Self {
            emac,
            stack,
            delay,
            config,
            ap: AccessPointConfig::new(),
            associated: None,
            state: ConnectionState::Idle,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Access point details from the last successful query while connected
    pub fn access_point(&self) -> Option<&AccessPointInfo> {
        self.associated.as_ref()
    }

    /// SSID of the stored credentials, empty if none were set
    pub fn ssid(&self) -> &str {
        self.ap.ssid()
    }

    /// Station MAC address of the co-processor
    pub fn mac_address(&self) -> Option<MacAddress> {
        self.emac.hwaddr()
    }

    pub fn emac(&self) -> &'static EspHostEmac<M, C, Q, P> {
        self.emac
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Bring up the co-processor, blocking for at most `timeout_ms`.
    ///
    /// Does nothing once the co-processor is initialized. Calls made from the
    /// link device's event queue are refused with [`NetError::WouldBlock`].
    pub fn initialize_hardware(&mut self, timeout_ms: u32) -> Result<(), NetError> {
        if self.emac.host().is_initialized() {
            return Ok(());
        }

        let previous = self.state;
        self.state = ConnectionState::Initializing;
        let result = self.emac.initialize_hardware(
            &mut self.delay,
            timeout_ms,
            self.config.init_poll_interval_ms,
        );
        self.state = previous;
        result
    }
}

impl<M, C, Q, P, S, D> WifiInterface for EspHostInterface<M, C, Q, P, S, D>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
    S: NetworkStack<EspHostEmac<M, C, Q, P>>,
    D: DelayNs,
{
    fn set_credentials(&mut self, ssid: &str, pass: &str, security: Security) -> Result<(), NetError> {
        self.ap.set(ssid, pass, security).map_err(|e| {
            warn!("wifi: rejected credentials for SSID of {} bytes", ssid.len());
            e
        })
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), NetError> {
        if channel == 0 {
            Ok(())
        } else {
            warn!("wifi: channel {} requested, only 0 is supported", channel);
            Err(NetError::Unsupported)
        }
    }

    fn connect(&mut self) -> Result<(), NetError> {
        self.initialize_hardware(self.config.init_timeout_ms)?;

        if self.ap.is_empty() {
            warn!("wifi: connect without an SSID");
            return Err(NetError::NoSsid);
        }
        if self.is_connected() {
            warn!("wifi: already connected");
            return Err(NetError::IsConnected);
        }

        info!("wifi: connecting to {}", self.ap.ssid());
        let host = self.emac.host();
        let ap = &self.ap;
        if let Err(e) = host.with_control(|c| c.connect_access_point(ap)) {
            warn!("wifi: access point refused the connection: {}", e);
            return Err(NetError::Parameter);
        }
        self.associated = match host.with_control(|c| c.access_point_config()) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("wifi: access point query failed: {}", e);
                None
            }
        };

        match self.stack.bring_up(self.emac) {
            Ok(()) | Err(NetError::IsConnected) => {}
            Err(e) => {
                warn!("wifi: IP interface failed to come up: {}", e);
                if let Err(e) = host.with_control(|c| c.disconnect_access_point()) {
                    debug!("wifi: disconnect after failed connect: {}", e);
                }
                if let Err(e) = self.stack.bring_down() {
                    debug!("wifi: bring down after failed connect: {}", e);
                }
                self.associated = None;
                return Err(NetError::ConnectionTimeout);
            }
        }

        self.state = ConnectionState::Connected;
        info!("wifi: connected to {}", self.ap.ssid());
        Ok(())
    }

    fn connect_to(
        &mut self,
        ssid: &str,
        pass: &str,
        security: Security,
        channel: u8,
    ) -> Result<(), NetError> {
        self.set_channel(channel)?;
        self.set_credentials(ssid, pass, security)?;
        self.connect()
    }

    fn disconnect(&mut self) -> Result<(), NetError> {
        if !self.is_connected() {
            return Err(NetError::NoConnection);
        }

        info!("wifi: disconnecting from {}", self.ap.ssid());
        let result = self.emac.host().with_control(|c| c.disconnect_access_point());
        self.state = ConnectionState::Idle;
        self.associated = None;
        if let Err(e) = self.stack.bring_down() {
            debug!("wifi: bring down failed: {}", e);
        }

        result.map_err(|e| {
            warn!("wifi: disconnect command failed: {}", e);
            NetError::DeviceError
        })
    }

    fn rssi(&mut self) -> i8 {
        if !self.is_connected() {
            return 0;
        }
        match self.emac.host().with_control(|c| c.access_point_config()) {
            Ok(info) => {
                let rssi = info.rssi;
                self.associated = Some(info);
                rssi
            }
            Err(e) => {
                debug!("wifi: signal strength query failed: {}", e);
                0
            }
        }
    }

    fn scan(&mut self, results: &mut [WifiAccessPoint]) -> Result<usize, NetError> {
        if results.is_empty() {
            return Ok(MAX_AP_COUNT);
        }
        self.initialize_hardware(self.config.init_timeout_ms)?;

        let mut records: Vec<AccessPointInfo, MAX_AP_COUNT> = Vec::new();
        self.emac
            .host()
            .with_control(|c| c.scan_access_points(&mut records))
            .map_err(|e| {
                warn!("wifi: scan failed: {}", e);
                NetError::DeviceError
            })?;

        let count = records.len().min(results.len());
        for (slot, record) in results.iter_mut().zip(records.iter()) {
            *slot = to_access_point(record);
        }
        info!("wifi: scan found {} access points", records.len());
        Ok(count)
    }
}

fn to_access_point(record: &AccessPointInfo) -> WifiAccessPoint {
    let bssid = parse_mac(&record.bssid).unwrap_or_else(|| {
        warn!("wifi: scan record with malformed BSSID {}", record.bssid.as_str());
        [0; HWADDR_SIZE]
    });
    WifiAccessPoint {
        ssid: record.ssid.clone(),
        bssid,
        security: record.encryption_mode.into(),
        rssi: record.rssi,
        channel: record.channel,
    }
}
