//! # Host Stack Contracts
//!
//! The traits on both sides of this driver that face the host operating system:
//!
//! - **Consumed**: [`MemoryManager`] (frame buffer pool), [`EventQueue`]
//!   (cooperative task runner) and [`NetworkStack`] (the IP stack's interface
//!   bring-up).
//! - **Exposed**: [`Emac`] (link-layer device) and [`WifiInterface`] (station
//!   lifecycle).
//!
//! ## Buffer ownership
//!
//! Frame buffers move by value. Whoever holds a `Buffer` owns it and must
//! either hand it on or give it back through [`MemoryManager::free`]; a buffer
//! cannot be released twice because `free` consumes it.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::config::SSID_MAX_LEN;
use crate::error::NetError;
use crate::mac::MacAddress;
use crate::security::Security;

/// Host buffer pool
pub trait MemoryManager {
    /// One possibly segmented frame buffer
    type Buffer: 'static;

    /// Allocate a contiguous buffer of `size` bytes whose payload starts on an
    /// `align` boundary
    fn alloc_heap(&self, size: usize, align: usize) -> Option<Self::Buffer>;

    /// Return a buffer (and all its segments) to the pool
    fn free(&self, buf: Self::Buffer);

    /// Whether the buffer continues in further segments
    fn is_chained(&self, buf: &Self::Buffer) -> bool;

    /// Length of the whole chain
    fn total_len(&self, buf: &Self::Buffer) -> usize;

    /// Length of the first segment
    fn len(&self, buf: &Self::Buffer) -> usize;

    /// Payload of the first segment
    fn payload<'b>(&self, buf: &'b Self::Buffer) -> &'b [u8];

    fn payload_mut<'b>(&self, buf: &'b mut Self::Buffer) -> &'b mut [u8];

    /// Shorten the first segment to `len` bytes; longer lengths are ignored
    fn truncate(&self, buf: &mut Self::Buffer, len: usize);

    /// Copy the whole chain of `from` into `to`
    fn copy(&self, to: &mut Self::Buffer, from: &Self::Buffer);
}

/// Work run periodically by the host's task runner
pub trait PeriodicTask {
    fn run(&self);
}

/// Host cooperative task runner
pub trait EventQueue {
    /// Identifies a scheduled task
    type Handle: Copy;

    /// Run `task` every `period_ms` until cancelled.
    /// Returns `None` if the queue cannot take the task.
    fn call_every(&self, period_ms: u32, task: &'static dyn PeriodicTask) -> Option<Self::Handle>;

    /// Stop a task. Returns `false` if the handle was not scheduled.
    fn cancel(&self, handle: Self::Handle) -> bool;

    /// Whether the caller is running on the context this queue dispatches
    /// its tasks from (for a thread-backed queue, the queue's own thread)
    fn is_dispatching(&self) -> bool;
}

/// Host IP stack, as seen by the station interface
pub trait NetworkStack<E: ?Sized> {
    /// Attach `emac` and bring the IP interface up (addressing included).
    /// The stack is expected to power the device up through [`Emac::power_up`].
    fn bring_up(&mut self, emac: &'static E) -> Result<(), NetError>;

    /// Bring the IP interface down
    fn bring_down(&mut self) -> Result<(), NetError>;
}

/// Receives frames from the link device; takes ownership of the buffer
pub type LinkInputCb<B> = &'static dyn Fn(B);

/// Told about link up (`true`) and down (`false`)
pub type LinkStateCb = &'static dyn Fn(bool);

/// Registration handle for a link device callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CallbackToken(pub(crate) u32);

/// Link-layer device contract
pub trait Emac {
    type Buffer: 'static;
    type MemoryManager: MemoryManager<Buffer = Self::Buffer> + 'static;

    /// Maximum transmission unit in bytes
    fn mtu_size(&self) -> usize;

    /// Preferred alignment of outgoing buffers
    fn align_preference(&self) -> usize;

    /// Write the interface name into `name`, truncated to its length.
    /// Returns the number of bytes written.
    fn ifname(&self, name: &mut [u8]) -> usize;

    fn hwaddr_size(&self) -> usize;

    /// Hardware address of the device, or `None` to let the stack pick one
    fn hwaddr(&self) -> Option<MacAddress>;

    /// Override the hardware address
    fn set_hwaddr(&self, addr: &MacAddress);

    /// Start the device. Returns `true` on success.
    fn power_up(&'static self) -> bool;

    fn power_down(&self);

    /// Send one frame. The buffer is always consumed.
    fn link_out(&self, buf: Self::Buffer) -> Result<(), NetError>;

    fn set_link_input_cb(&self, cb: LinkInputCb<Self::Buffer>) -> CallbackToken;

    /// Remove the input callback if `token` is still the current registration
    fn clear_link_input_cb(&self, token: CallbackToken) -> bool;

    fn set_link_state_cb(&self, cb: LinkStateCb) -> CallbackToken;

    fn clear_link_state_cb(&self, token: CallbackToken) -> bool;

    fn add_multicast_group(&self, addr: &MacAddress);

    fn remove_multicast_group(&self, addr: &MacAddress);

    fn set_all_multicast(&self, all: bool);

    /// Attach the pool used for every buffer this device allocates or frees.
    /// Must be called before any frame is sent or received.
    fn set_memory_manager(&self, memory: &'static Self::MemoryManager);
}

/// An access point as reported to applications
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WifiAccessPoint {
    pub ssid: String<SSID_MAX_LEN>,
    pub bssid: MacAddress,
    pub security: Security,
    /// Signal strength in dBm
    pub rssi: i8,
    pub channel: u8,
}

/// Wi-Fi station contract
///
/// Methods take `&mut self`: one caller at a time, which is the exclusive lock
/// the station state lives under. Share an interface between tasks by putting
/// it behind a mutex.
pub trait WifiInterface {
    /// Store credentials for the next [`WifiInterface::connect`]
    fn set_credentials(&mut self, ssid: &str, pass: &str, security: Security) -> Result<(), NetError>;

    /// Only channel 0 (any) is supported
    fn set_channel(&mut self, channel: u8) -> Result<(), NetError>;

    /// Join the configured network
    fn connect(&mut self) -> Result<(), NetError>;

    /// Store credentials and join
    fn connect_to(
        &mut self,
        ssid: &str,
        pass: &str,
        security: Security,
        channel: u8,
    ) -> Result<(), NetError>;

    fn disconnect(&mut self) -> Result<(), NetError>;

    /// Signal strength of the current association in dBm, 0 if not connected
    fn rssi(&mut self) -> i8;

    /// Scan into `results`, returning how many entries were written.
    /// An empty slice returns the maximum number of results supported
    /// without scanning.
    fn scan(&mut self, results: &mut [WifiAccessPoint]) -> Result<usize, NetError>;
}
