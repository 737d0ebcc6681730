//! # ESPHost Link Device
//!
//! [`EspHostEmac`] is the Ethernet-MAC equivalent the host IP stack talks to.
//! It owns no protocol logic: frames go out through
//! [`ControlService::send_buffer`] and come in through a periodic poll of the
//! co-processor's station receive queue.
//!
//! ## Data Flow
//!
//! ```text
//! host stack ──link_out──► [coalesce if chained/misaligned] ──► send_buffer
//!
//! event queue ──every 20 ms──► receive_task
//!                                 ├─ communicate()
//!                                 ├─ peek_station_rx_size()
//!                                 ├─ alloc_heap(size, 4)
//!                                 ├─ read_station_rx()
//!                                 └─► link input callback (owns the buffer)
//! ```
//!
//! `link_out` must not be called from interrupt context: it takes the
//! co-processor lock and blocks on an SPI exchange. Hardware initialization
//! goes through [`EspHostEmac::initialize_hardware`], which refuses to block
//! the event queue the receive poll runs on.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, trace, warn};

use crate::config::{
    EmacConfig, BUFF_ALIGNMENT, HWADDR_SIZE, MAX_FRAME_LEN, WIFI_IF_NAME, WIFI_MTU_SIZE,
};
use crate::control::{ControlService, EspHost, Interface};
use crate::error::NetError;
use crate::mac::{parse_mac, MacAddress};
use crate::traits::{
    CallbackToken, Emac, EventQueue, LinkInputCb, LinkStateCb, MemoryManager, PeriodicTask,
};

/// Snapshot of the link device counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmacStats {
    /// Frames accepted by the co-processor
    pub tx_frames: u32,
    /// Frames that could not be sent (allocation or device failure)
    pub tx_errors: u32,
    /// Frames that had to be copied into a contiguous aligned buffer
    pub tx_coalesced: u32,
    /// Frames handed to the input callback
    pub rx_frames: u32,
    /// Receive attempts abandoned for lack of a buffer or of a consumer
    pub rx_dropped: u32,
    /// Receive attempts that failed on the device side or announced an
    /// oversized frame
    pub rx_errors: u32,
}

#[derive(Default)]
struct Counters {
    tx_frames: AtomicU32,
    tx_errors: AtomicU32,
    tx_coalesced: AtomicU32,
    rx_frames: AtomicU32,
    rx_dropped: AtomicU32,
    rx_errors: AtomicU32,
}

impl Counters {
    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EmacStats {
        EmacStats {
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            tx_coalesced: self.tx_coalesced.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
        }
    }
}

struct EmacState<P: MemoryManager + 'static, H> {
    memory: Option<&'static P>,
    input_cb: Option<(CallbackToken, LinkInputCb<P::Buffer>)>,
    state_cb: Option<(CallbackToken, LinkStateCb)>,
    receive_task: Option<H>,
    next_token: u32,
}

impl<P: MemoryManager + 'static, H> EmacState<P, H> {
    fn issue_token(&mut self) -> CallbackToken {
        self.next_token = self.next_token.wrapping_add(1);
        CallbackToken(self.next_token)
    }
}

/// Link device backed by an ESP-Hosted co-processor
pub struct EspHostEmac<M, C, Q, P>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
{
    host: &'static EspHost<M, C>,
    queue: &'static Q,
    config: EmacConfig,
    state: Mutex<M, RefCell<EmacState<P, Q::Handle>>>,
    counters: Counters,
}

impl<M, C, Q, P> EspHostEmac<M, C, Q, P>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
{
    pub fn new(host: &'static EspHost<M, C>, queue: &'static Q) -> Self {
        Self::with_config(host, queue, EmacConfig::default())
    }

    pub fn with_config(host: &'static EspHost<M, C>, queue: &'static Q, config: EmacConfig) -> Self {
        Self {
            host,
            queue,
            config,
            state: Mutex::new(RefCell::new(EmacState {
                memory: None,
                input_cb: None,
                state_cb: None,
                receive_task: None,
                next_token: 0,
            })),
            counters: Counters::default(),
        }
    }

    /// The co-processor this device sends through
    pub fn host(&self) -> &'static EspHost<M, C> {
        self.host
    }

    pub fn stats(&self) -> EmacStats {
        self.counters.snapshot()
    }

    /// Bring up the co-processor, blocking the caller for at most `timeout_ms`.
    ///
    /// Returns at once if it is already initialized. Otherwise callers running
    /// on the event queue's dispatch context get [`NetError::WouldBlock`]: the
    /// init event is delivered by the protocol pump, which that context also
    /// has to drive.
    pub fn initialize_hardware<D: DelayNs>(
        &self,
        delay: &mut D,
        timeout_ms: u32,
        poll_interval_ms: u32,
    ) -> Result<(), NetError> {
        if self.host.is_initialized() {
            return Ok(());
        }
        if self.queue.is_dispatching() {
            warn!("emac: hardware initialization requested from the event queue");
            return Err(NetError::WouldBlock);
        }
        self.host.initialize(delay, timeout_ms, poll_interval_ms)
    }

    /// Whether the receive poll task is scheduled
    pub fn is_powered(&self) -> bool {
        self.with_state(|state| state.receive_task.is_some())
    }

    /// One receive poll: pump the protocol, then pick up at most one frame.
    ///
    /// Normally run by the event queue registered in [`Emac::power_up`].
    pub fn receive_task(&self) {
        self.host.communicate();

        let frame = match self.low_level_input() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                error!("emac: receive failed: {}", e);
                return;
            }
        };

        let (memory, input_cb) = self.with_state(|state| (state.memory, state.input_cb));
        match input_cb {
            Some((_, cb)) => {
                Counters::bump(&self.counters.rx_frames);
                cb(frame);
            }
            None => {
                debug!("emac: no input callback, dropping frame");
                Counters::bump(&self.counters.rx_dropped);
                if let Some(memory) = memory {
                    memory.free(frame);
                }
            }
        }
    }

    fn low_level_input(&self) -> Result<Option<P::Buffer>, NetError> {
        let memory = self.memory().ok_or(NetError::NotReady)?;

        let size = self.host.with_control(|control| control.peek_station_rx_size());
        if size == 0 {
            return Ok(None);
        }
        if size > MAX_FRAME_LEN {
            warn!("emac: pending frame of {} bytes exceeds {}, skipped", size, MAX_FRAME_LEN);
            Counters::bump(&self.counters.rx_errors);
            return Ok(None);
        }

        let Some(mut buf) = memory.alloc_heap(size, BUFF_ALIGNMENT) else {
            warn!("emac: no buffer for {} byte frame, dropped", size);
            Counters::bump(&self.counters.rx_dropped);
            return Ok(None);
        };

        let read = self.host.with_control(|control| {
            control.read_station_rx(Interface::Station, memory.payload_mut(&mut buf))
        });
        match read {
            Ok(len) => {
                if len != size {
                    warn!("emac: read {} bytes of a {} byte frame", len, size);
                    memory.truncate(&mut buf, len);
                }
                trace!("emac: received {} bytes", len);
                Ok(Some(buf))
            }
            Err(e) => {
                memory.free(buf);
                Counters::bump(&self.counters.rx_errors);
                Err(e.into())
            }
        }
    }

    fn memory(&self) -> Option<&'static P> {
        self.with_state(|state| state.memory)
    }

    fn notify_link(&self, up: bool) {
        let cb = self.with_state(|state| state.state_cb);
        if let Some((_, cb)) = cb {
            cb(up);
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EmacState<P, Q::Handle>) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }
}

impl<M, C, Q, P> PeriodicTask for EspHostEmac<M, C, Q, P>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
{
    fn run(&self) {
        self.receive_task();
    }
}

impl<M, C, Q, P> Emac for EspHostEmac<M, C, Q, P>
where
    M: RawMutex + 'static,
    C: ControlService + 'static,
    Q: EventQueue + 'static,
    P: MemoryManager + 'static,
{
    type Buffer = P::Buffer;
    type MemoryManager = P;

    fn mtu_size(&self) -> usize {
        WIFI_MTU_SIZE
    }

    fn align_preference(&self) -> usize {
        BUFF_ALIGNMENT
    }

    fn ifname(&self, name: &mut [u8]) -> usize {
        let n = name.len().min(WIFI_IF_NAME.len());
        name[..n].copy_from_slice(&WIFI_IF_NAME.as_bytes()[..n]);
        n
    }

    fn hwaddr_size(&self) -> usize {
        HWADDR_SIZE
    }

    fn hwaddr(&self) -> Option<MacAddress> {
        match self.host.with_control(|control| control.station_mac_address()) {
            Ok(text) => {
                let mac = parse_mac(&text);
                if mac.is_none() {
                    warn!("emac: co-processor reported malformed MAC {}", text.as_str());
                }
                mac
            }
            Err(e) => {
                debug!("emac: MAC query failed: {}", e);
                None
            }
        }
    }

    // The co-processor keeps its own station MAC.
    fn set_hwaddr(&self, _addr: &MacAddress) {
        debug!("emac: hardware address override ignored");
    }

    fn power_up(&'static self) -> bool {
        if !self.is_powered() {
            let Some(handle) = self.queue.call_every(self.config.receive_period_ms, self) else {
                error!("emac: event queue refused the receive task");
                return false;
            };
            self.with_state(|state| state.receive_task = Some(handle));
            info!("emac: powered up, polling every {} ms", self.config.receive_period_ms);
        }
        self.notify_link(true);
        true
    }

    fn power_down(&self) {
        if let Some(handle) = self.with_state(|state| state.receive_task.take()) {
            self.queue.cancel(handle);
            info!("emac: powered down");
            self.notify_link(false);
        }
    }

    fn link_out(&self, buf: P::Buffer) -> Result<(), NetError> {
        let Some(memory) = self.memory() else {
            error!("emac: link_out before set_memory_manager");
            Counters::bump(&self.counters.tx_errors);
            return Err(NetError::NotReady);
        };

        let mut buf = buf;
        let misaligned = memory.payload(&buf).as_ptr() as usize % BUFF_ALIGNMENT != 0;
        if memory.is_chained(&buf) || misaligned {
            let Some(mut copy) = memory.alloc_heap(memory.total_len(&buf), BUFF_ALIGNMENT) else {
                memory.free(buf);
                warn!("emac: no buffer to coalesce outgoing frame");
                Counters::bump(&self.counters.tx_errors);
                return Err(NetError::NoMemory);
            };
            memory.copy(&mut copy, &buf);
            memory.free(buf);
            buf = copy;
            Counters::bump(&self.counters.tx_coalesced);
        }

        let len = memory.len(&buf);
        let result = self.host.with_control(|control| {
            control.send_buffer(Interface::Station, &memory.payload(&buf)[..len])
        });
        memory.free(buf);

        match result {
            Ok(()) => {
                trace!("emac: sent {} bytes", len);
                Counters::bump(&self.counters.tx_frames);
                Ok(())
            }
            Err(e) => {
                debug!("emac: send failed: {}", e);
                Counters::bump(&self.counters.tx_errors);
                Err(NetError::DeviceError)
            }
        }
    }

    fn set_link_input_cb(&self, cb: LinkInputCb<P::Buffer>) -> CallbackToken {
        self.with_state(|state| {
            if state.input_cb.is_some() {
                warn!("emac: replacing link input callback");
            }
            let token = state.issue_token();
            state.input_cb = Some((token, cb));
            token
        })
    }

    fn clear_link_input_cb(&self, token: CallbackToken) -> bool {
        self.with_state(|state| match state.input_cb {
            Some((current, _)) if current == token => {
                state.input_cb = None;
                true
            }
            _ => false,
        })
    }

    fn set_link_state_cb(&self, cb: LinkStateCb) -> CallbackToken {
        self.with_state(|state| {
            if state.state_cb.is_some() {
                warn!("emac: replacing link state callback");
            }
            let token = state.issue_token();
            state.state_cb = Some((token, cb));
            token
        })
    }

    fn clear_link_state_cb(&self, token: CallbackToken) -> bool {
        self.with_state(|state| match state.state_cb {
            Some((current, _)) if current == token => {
                state.state_cb = None;
                true
            }
            _ => false,
        })
    }

    // No multicast filtering over the control link.
    fn add_multicast_group(&self, _addr: &MacAddress) {}

    fn remove_multicast_group(&self, _addr: &MacAddress) {}

    fn set_all_multicast(&self, _all: bool) {}

    fn set_memory_manager(&self, memory: &'static P) {
        self.with_state(|state| state.memory = Some(memory));
    }
}
