//! # Co-processor Control Service
//!
//! The ESP-Hosted control library owns the SPI transport and the
//! command/response protocol with the co-processor. This driver only consumes
//! it, through the [`ControlService`] trait.
//!
//! ## Sharing the co-processor
//!
//! Two execution contexts talk to the co-processor: the periodic receive task
//! of the link device and the application calling connect/scan. [`EspHost`]
//! wraps the control service in a single blocking mutex so that every call,
//! the protocol pump included, is serialized no matter which context issues
//! it. It also owns the hardware initialization state, so several independent
//! instances can coexist and a test can reset it between runs.
//!
//! ```text
//!  receive task ──┐
//!                 ├──► EspHost ──lock──► ControlService ──SPI──► ESP32
//!  application ───┘      │
//!                        └── InitSignal (set from inside communicate())
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;
use heapless::{String, Vec};
use log::{debug, info, warn};

use crate::config::{MAX_AP_COUNT, PASSPHRASE_MAX_LEN, SSID_MAX_LEN};
use crate::error::{ControlError, NetError};
use crate::mac::MacString;
use crate::security::{EncryptionMode, Security};

/// Co-processor network interface a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Interface {
    Station = 0,
}

/// Credentials of the access point to join
///
/// Fields are fixed-capacity; the passphrase is zeroed whenever it is replaced.
#[derive(Clone, Default)]
pub struct AccessPointConfig {
    ssid: String<SSID_MAX_LEN>,
    passphrase: Vec<u8, PASSPHRASE_MAX_LEN>,
    encryption_mode: Option<EncryptionMode>,
}

impl AccessPointConfig {
    pub const fn new() -> Self {
        Self {
            ssid: String::new(),
            passphrase: Vec::new(),
            encryption_mode: None,
        }
    }

    /// Check credentials without storing them
    pub fn validate(ssid: &str, passphrase: &str, security: Security) -> Result<(), NetError> {
        if ssid.is_empty() || ssid.len() > SSID_MAX_LEN {
            return Err(NetError::Parameter);
        }
        if security.requires_passphrase()
            && (passphrase.is_empty() || passphrase.len() > PASSPHRASE_MAX_LEN)
        {
            return Err(NetError::Parameter);
        }
        Ok(())
    }

    /// Validate and store credentials.
    ///
    /// On error nothing is modified. On success the previous passphrase is
    /// wiped first, and an open network keeps no passphrase at all.
    pub fn set(&mut self, ssid: &str, passphrase: &str, security: Security) -> Result<(), NetError> {
        Self::validate(ssid, passphrase, security)?;

        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| NetError::Parameter)?;

        self.wipe_passphrase();
        if security.requires_passphrase() {
            self.passphrase
                .extend_from_slice(passphrase.as_bytes())
                .map_err(|_| NetError::Parameter)?;
        }
        self.encryption_mode = Some(security.into());
        Ok(())
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn passphrase(&self) -> &[u8] {
        &self.passphrase
    }

    /// Authentication mode to request, `Open` until credentials are set
    pub fn encryption_mode(&self) -> EncryptionMode {
        self.encryption_mode.unwrap_or(EncryptionMode::Open)
    }

    /// No SSID configured yet
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }

    fn wipe_passphrase(&mut self) {
        self.passphrase.iter_mut().for_each(|b| *b = 0);
        self.passphrase.clear();
    }
}

impl core::fmt::Debug for AccessPointConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessPointConfig")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("encryption_mode", &self.encryption_mode)
            .finish()
    }
}

impl Drop for AccessPointConfig {
    fn drop(&mut self) {
        self.wipe_passphrase();
    }
}

/// An access point as reported by the co-processor, either the one we are
/// associated with or a scan hit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccessPointInfo {
    pub ssid: String<SSID_MAX_LEN>,
    /// BSSID in textual form
    pub bssid: MacString,
    /// Signal strength in dBm
    pub rssi: i8,
    pub channel: u8,
    pub encryption_mode: EncryptionMode,
}

/// The external ESP-Hosted control library
///
/// Every method is a synchronous request/response exchange with the
/// co-processor. None of them time out; a hang in the transport hangs the
/// caller.
pub trait ControlService {
    /// Send one frame on the given interface
    fn send_buffer(&mut self, iface: Interface, data: &[u8]) -> Result<(), ControlError>;

    /// Size of the next pending station frame, 0 if none
    fn peek_station_rx_size(&mut self) -> usize;

    /// Read the pending station frame into `buf`, returning its length
    fn read_station_rx(&mut self, iface: Interface, buf: &mut [u8]) -> Result<usize, ControlError>;

    /// Station MAC in textual form
    fn station_mac_address(&mut self) -> Result<MacString, ControlError>;

    /// Join the access point described by `config`
    fn connect_access_point(&mut self, config: &AccessPointConfig) -> Result<(), ControlError>;

    fn disconnect_access_point(&mut self) -> Result<(), ControlError>;

    /// Details of the access point we are associated with
    fn access_point_config(&mut self) -> Result<AccessPointInfo, ControlError>;

    /// Scan for access points, filling at most `out.capacity()` records
    fn scan_access_points(
        &mut self,
        out: &mut Vec<AccessPointInfo, MAX_AP_COUNT>,
    ) -> Result<(), ControlError>;

    /// Bring up the SPI transport to the co-processor
    fn start_transport_driver(&mut self) -> Result<(), ControlError>;

    /// Register the object to notify once the co-processor reports ready.
    /// The notification is delivered from within [`ControlService::communicate`].
    fn listen_for_init_event(&mut self, signal: &'static InitSignal);

    /// Advance the protocol: exchange pending SPI messages and deliver events
    fn communicate(&mut self);
}

/// Hardware initialization progress of one co-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitState {
    NotStarted,
    Starting,
    Ready,
    Failed,
}

/// Init-complete notification target handed to the control service
pub struct InitSignal {
    state: AtomicU8,
}

impl InitSignal {
    const NOT_STARTED: u8 = 0;
    const STARTING: u8 = 1;
    const READY: u8 = 2;
    const FAILED: u8 = 3;

    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(Self::NOT_STARTED),
        }
    }

    /// Called by the control service when the co-processor is up
    pub fn notify(&self) {
        self.state.store(Self::READY, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == Self::READY
    }

    pub fn state(&self) -> InitState {
        match self.state.load(Ordering::Acquire) {
            Self::STARTING => InitState::Starting,
            Self::READY => InitState::Ready,
            Self::FAILED => InitState::Failed,
            _ => InitState::NotStarted,
        }
    }

    fn begin(&self) {
        self.state.store(Self::STARTING, Ordering::Release);
    }

    // A notification that raced in before the failure is kept.
    fn fail(&self) {
        let _ = self.state.compare_exchange(
            Self::STARTING,
            Self::FAILED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn reset(&self) {
        self.state.store(Self::NOT_STARTED, Ordering::Release);
    }
}

impl Default for InitSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to one co-processor
pub struct EspHost<M: RawMutex, C> {
    control: Mutex<M, RefCell<C>>,
    init: InitSignal,
}

impl<M: RawMutex, C: ControlService> EspHost<M, C> {
    pub const fn new(control: C) -> Self {
        Self {
            control: Mutex::new(RefCell::new(control)),
            init: InitSignal::new(),
        }
    }

    /// Run `f` with exclusive access to the control service.
    ///
    /// Must not be nested.
    pub fn with_control<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        self.control.lock(|control| f(&mut control.borrow_mut()))
    }

    /// Pump the protocol once
    pub fn communicate(&self) {
        self.with_control(|control| control.communicate());
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_ready()
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    /// Forget a completed initialization, e.g. after the co-processor was
    /// power cycled
    pub fn reset_initialization(&self) {
        debug!("esphost: initialization state reset");
        self.init.reset();
    }

    /// Bring up the co-processor and wait for its init-complete event.
    ///
    /// Returns immediately if it is already initialized. Otherwise this blocks
    /// the calling context for up to `timeout_ms`, pumping the protocol every
    /// `poll_interval_ms`. A previous failed attempt is retried from scratch.
    ///
    /// Reached through [`EspHostEmac::initialize_hardware`], which refuses
    /// callers running on the receive poll's event queue.
    ///
    /// [`EspHostEmac::initialize_hardware`]: crate::emac::EspHostEmac::initialize_hardware
    pub(crate) fn initialize<D: DelayNs>(
        &'static self,
        delay: &mut D,
        timeout_ms: u32,
        poll_interval_ms: u32,
    ) -> Result<(), NetError> {
        if self.init.is_ready() {
            return Ok(());
        }
        info!("esphost: initializing co-processor");
        self.init.begin();
        let signal: &'static InitSignal = &self.init;
        let started = self.with_control(|control| {
            control.listen_for_init_event(signal);
            control.start_transport_driver()
        });
        if let Err(e) = started {
            warn!("esphost: transport driver failed to start: {}", e);
            self.init.fail();
            return Err(NetError::DeviceError);
        }

        let poll_interval_ms = poll_interval_ms.max(1);
        let mut waited_ms: u32 = 0;
        while !self.init.is_ready() && waited_ms < timeout_ms {
            self.communicate();
            delay.delay_ms(poll_interval_ms);
            waited_ms = waited_ms.saturating_add(poll_interval_ms);
        }

        if self.init.is_ready() {
            info!("esphost: co-processor ready after {} ms", waited_ms);
            Ok(())
        } else {
            warn!("esphost: no init event within {} ms", timeout_ms);
            self.init.fail();
            Err(NetError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{leak_host, MockDelay};

    #[test]
    fn test_credentials_reject_bad_ssid() {
        let mut ap = AccessPointConfig::new();
        ap.set("home", "secretpw", Security::Wpa2).unwrap();

        let long = "x".repeat(33);
        assert_eq!(ap.set("", "pw", Security::None), Err(NetError::Parameter));
        assert_eq!(
            ap.set(&long, "secretpw", Security::Wpa2),
            Err(NetError::Parameter)
        );

        assert_eq!(ap.ssid(), "home");
        assert_eq!(ap.passphrase(), b"secretpw");
        assert_eq!(ap.encryption_mode(), EncryptionMode::Wpa2Psk);
    }

    #[test]
    fn test_credentials_boundary_lengths() {
        let mut ap = AccessPointConfig::new();
        let ssid = "s".repeat(32);
        let pass = "p".repeat(63);
        assert!(ap.set(&ssid, &pass, Security::Wpa2).is_ok());
        assert_eq!(ap.passphrase().len(), 63);

        let too_long = "p".repeat(64);
        assert_eq!(
            ap.set("home", &too_long, Security::Wpa2),
            Err(NetError::Parameter)
        );
        assert_eq!(ap.set("home", "", Security::Wpa), Err(NetError::Parameter));
    }

    #[test]
    fn test_open_network_clears_previous_passphrase() {
        let mut ap = AccessPointConfig::new();
        ap.set("home", "secretpw", Security::Wpa2).unwrap();
        ap.set("cafe", "ignored-anyway", Security::None).unwrap();

        assert_eq!(ap.ssid(), "cafe");
        assert!(ap.passphrase().is_empty());
        assert_eq!(ap.encryption_mode(), EncryptionMode::Open);
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let mut ap = AccessPointConfig::new();
        ap.set("home", "secretpw", Security::Wpa2).unwrap();
        let text = format!("{:?}", ap);
        assert!(text.contains("home"));
        assert!(!text.contains("secretpw"));
    }

    #[test]
    fn test_initialize_waits_for_init_event() {
        let host = leak_host();
        host.with_control(|c| c.init_after_pumps = Some(3));
        let mut delay = MockDelay::default();

        assert_eq!(host.initialize(&mut delay, 10_000, 100), Ok(()));
        assert!(host.is_initialized());
        assert_eq!(host.with_control(|c| c.pumps), 3);
        assert_eq!(host.with_control(|c| c.transport_starts), 1);
        assert_eq!(delay.elapsed_ms(), 300);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let host = leak_host();
        host.with_control(|c| c.init_after_pumps = Some(1));
        let mut delay = MockDelay::default();

        host.initialize(&mut delay, 1_000, 100).unwrap();
        host.initialize(&mut delay, 1_000, 100).unwrap();
        assert_eq!(host.with_control(|c| c.transport_starts), 1);
    }

    #[test]
    fn test_initialize_times_out_then_retries() {
        let host = leak_host();
        let mut delay = MockDelay::default();

        assert_eq!(host.initialize(&mut delay, 500, 100), Err(NetError::Timeout));
        assert_eq!(delay.elapsed_ms(), 500);
        assert_eq!(host.init_state(), InitState::Failed);

        host.with_control(|c| c.init_after_pumps = Some(c.pumps + 1));
        assert_eq!(host.initialize(&mut delay, 500, 100), Ok(()));
        assert_eq!(host.with_control(|c| c.transport_starts), 2);
        assert_eq!(host.init_state(), InitState::Ready);
    }

    #[test]
    fn test_initialize_reports_transport_failure() {
        let host = leak_host();
        host.with_control(|c| c.transport_result = Err(ControlError::FAILED));
        let mut delay = MockDelay::default();

        assert_eq!(
            host.initialize(&mut delay, 500, 100),
            Err(NetError::DeviceError)
        );
        assert_eq!(host.with_control(|c| c.pumps), 0);
        assert_eq!(host.init_state(), InitState::Failed);
    }

    #[test]
    fn test_reset_initialization() {
        let host = leak_host();
        host.init.notify();
        assert!(host.is_initialized());
        host.reset_initialization();
        assert_eq!(host.init_state(), InitState::NotStarted);
    }
}
