//! Test doubles for the control service, the host task runner, the IP stack and
//! the delay provider.

use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::delay::DelayNs;

use crate::buffer::HeapMemoryManager;
use crate::config::MAX_AP_COUNT;
use crate::control::{AccessPointConfig, AccessPointInfo, ControlService, EspHost, InitSignal, Interface};
use crate::emac::EspHostEmac;
use crate::error::{ControlError, NetError};
use crate::mac::MacString;
use crate::security::EncryptionMode;
use crate::traits::{Emac, EventQueue, NetworkStack, PeriodicTask};

pub type TestHost = EspHost<NoopRawMutex, MockControl>;
pub type TestEmac = EspHostEmac<NoopRawMutex, MockControl, MockQueue, HeapMemoryManager>;

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

pub fn leak_host() -> &'static TestHost {
    leak(EspHost::new(MockControl::default()))
}

/// Link device wired to a mock control service, a mock queue and a heap pool
pub fn leak_emac() -> (&'static TestEmac, &'static HeapMemoryManager) {
    let emac = leak(EspHostEmac::new(leak_host(), leak(MockQueue::default())));
    let pool = leak(HeapMemoryManager::new());
    emac.set_memory_manager(pool);
    (emac, pool)
}

/// Credentials as they reached the co-processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub ssid: std::string::String,
    pub passphrase: Vec<u8>,
    pub encryption_mode: EncryptionMode,
}

pub struct MockControl {
    pub sent: Vec<(Interface, Vec<u8>)>,
    pub send_result: Result<(), ControlError>,
    pub rx_frames: VecDeque<Vec<u8>>,
    pub rx_read_result: Result<(), ControlError>,
    /// Report this many bytes read instead of the frame length
    pub rx_read_len: Option<usize>,
    pub peeks: usize,
    pub mac: Result<MacString, ControlError>,
    pub connect_requests: Vec<ConnectRequest>,
    pub connect_result: Result<(), ControlError>,
    pub disconnect_calls: usize,
    pub disconnect_result: Result<(), ControlError>,
    pub ap_info: Result<AccessPointInfo, ControlError>,
    pub ap_config_calls: usize,
    pub scan_records: Vec<AccessPointInfo>,
    pub scan_result: Result<(), ControlError>,
    pub scan_calls: usize,
    pub transport_result: Result<(), ControlError>,
    pub transport_starts: usize,
    pub init_signal: Option<&'static InitSignal>,
    /// Deliver the init event on this pump count
    pub init_after_pumps: Option<usize>,
    pub pumps: usize,
}

impl Default for MockControl {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            send_result: Ok(()),
            rx_frames: VecDeque::new(),
            rx_read_result: Ok(()),
            rx_read_len: None,
            peeks: 0,
            mac: Ok(MacString::try_from("24:6f:28:0a:bc:01").unwrap()),
            connect_requests: Vec::new(),
            connect_result: Ok(()),
            disconnect_calls: 0,
            disconnect_result: Ok(()),
            ap_info: Ok(AccessPointInfo::default()),
            ap_config_calls: 0,
            scan_records: Vec::new(),
            scan_result: Ok(()),
            scan_calls: 0,
            transport_result: Ok(()),
            transport_starts: 0,
            init_signal: None,
            init_after_pumps: None,
            pumps: 0,
        }
    }
}

impl ControlService for MockControl {
    fn send_buffer(&mut self, iface: Interface, data: &[u8]) -> Result<(), ControlError> {
        self.sent.push((iface, data.to_vec()));
        self.send_result
    }

    fn peek_station_rx_size(&mut self) -> usize {
        self.peeks += 1;
        self.rx_frames.front().map_or(0, Vec::len)
    }

    fn read_station_rx(&mut self, _iface: Interface, buf: &mut [u8]) -> Result<usize, ControlError> {
        self.rx_read_result?;
        let frame = self.rx_frames.pop_front().ok_or(ControlError::FAILED)?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(self.rx_read_len.map_or(n, |len| len.min(n)))
    }

    fn station_mac_address(&mut self) -> Result<MacString, ControlError> {
        self.mac.clone()
    }

    fn connect_access_point(&mut self, config: &AccessPointConfig) -> Result<(), ControlError> {
        self.connect_requests.push(ConnectRequest {
            ssid: config.ssid().into(),
            passphrase: config.passphrase().to_vec(),
            encryption_mode: config.encryption_mode(),
        });
        self.connect_result
    }

    fn disconnect_access_point(&mut self) -> Result<(), ControlError> {
        self.disconnect_calls += 1;
        self.disconnect_result
    }

    fn access_point_config(&mut self) -> Result<AccessPointInfo, ControlError> {
        self.ap_config_calls += 1;
        self.ap_info.clone()
    }

    fn scan_access_points(
        &mut self,
        out: &mut heapless::Vec<AccessPointInfo, MAX_AP_COUNT>,
    ) -> Result<(), ControlError> {
        self.scan_calls += 1;
        self.scan_result?;
        for record in self.scan_records.iter().take(out.capacity()) {
            let _ = out.push(record.clone());
        }
        Ok(())
    }

    fn start_transport_driver(&mut self) -> Result<(), ControlError> {
        self.transport_starts += 1;
        self.transport_result
    }

    fn listen_for_init_event(&mut self, signal: &'static InitSignal) {
        self.init_signal = Some(signal);
    }

    fn communicate(&mut self) {
        self.pumps += 1;
        if let (Some(signal), Some(after)) = (self.init_signal, self.init_after_pumps) {
            if self.pumps >= after {
                signal.notify();
            }
        }
    }
}

/// Context the application code runs on
pub const APP_CONTEXT: u32 = 1;
/// Context the queue dispatches its tasks from
pub const QUEUE_CONTEXT: u32 = 2;

/// Records scheduled tasks; tests run them by hand.
///
/// `context` simulates which execution context is currently running. It is
/// [`QUEUE_CONTEXT`] for the duration of [`MockQueue::tick`] and can be set by
/// a test to model another context preempting a task.
pub struct MockQueue {
    tasks: RefCell<Vec<(u32, u32, &'static dyn PeriodicTask)>>,
    next_handle: Cell<u32>,
    pub refuse: Cell<bool>,
    pub context: Cell<u32>,
}

impl Default for MockQueue {
    fn default() -> Self {
        Self {
            tasks: RefCell::new(Vec::new()),
            next_handle: Cell::new(0),
            refuse: Cell::new(false),
            context: Cell::new(APP_CONTEXT),
        }
    }
}

impl MockQueue {
    pub fn scheduled(&self) -> Vec<(u32, u32)> {
        self.tasks
            .borrow()
            .iter()
            .map(|(handle, period, _)| (*handle, *period))
            .collect()
    }

    /// Run every scheduled task once
    pub fn tick(&self) {
        let tasks: Vec<_> = self.tasks.borrow().iter().map(|(_, _, t)| *t).collect();
        let caller = self.context.replace(QUEUE_CONTEXT);
        for task in tasks {
            task.run();
        }
        self.context.set(caller);
    }
}

impl EventQueue for MockQueue {
    type Handle = u32;

    fn call_every(&self, period_ms: u32, task: &'static dyn PeriodicTask) -> Option<u32> {
        if self.refuse.get() {
            return None;
        }
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        self.tasks.borrow_mut().push((handle, period_ms, task));
        Some(handle)
    }

    fn cancel(&self, handle: u32) -> bool {
        let mut tasks = self.tasks.borrow_mut();
        let before = tasks.len();
        tasks.retain(|(h, _, _)| *h != handle);
        tasks.len() != before
    }

    fn is_dispatching(&self) -> bool {
        self.context.get() == QUEUE_CONTEXT
    }
}

/// IP stack that powers the device up like a real one would
pub struct MockStack {
    pub bring_up_result: Result<(), NetError>,
    pub bring_down_result: Result<(), NetError>,
    pub bring_ups: usize,
    pub bring_downs: usize,
}

impl Default for MockStack {
    fn default() -> Self {
        Self {
            bring_up_result: Ok(()),
            bring_down_result: Ok(()),
            bring_ups: 0,
            bring_downs: 0,
        }
    }
}

impl<E: Emac> NetworkStack<E> for MockStack {
    fn bring_up(&mut self, emac: &'static E) -> Result<(), NetError> {
        self.bring_ups += 1;
        if !emac.power_up() {
            return Err(NetError::DeviceError);
        }
        self.bring_up_result
    }

    fn bring_down(&mut self) -> Result<(), NetError> {
        self.bring_downs += 1;
        self.bring_down_result
    }
}

/// Delay that only advances a virtual clock
#[derive(Default)]
pub struct MockDelay {
    elapsed_ns: u64,
}

impl MockDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}
