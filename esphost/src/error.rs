//! Error types for the link device and the station interface.

use thiserror::Error;

/// Errors surfaced to the host network stack and to applications
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetError {
    /// Invalid SSID, passphrase or channel, or the access point refused them
    #[error("invalid parameter")]
    Parameter,
    /// No SSID has been configured
    #[error("no SSID configured")]
    NoSsid,
    /// The station is already associated
    #[error("already connected")]
    IsConnected,
    /// The station is not associated
    #[error("not connected")]
    NoConnection,
    /// The co-processor link does not support the operation
    #[error("operation not supported")]
    Unsupported,
    /// The control service reported a failure
    #[error("device error")]
    DeviceError,
    /// The access point accepted us but the IP interface never came up
    #[error("connection timed out")]
    ConnectionTimeout,
    /// The buffer pool could not satisfy an allocation
    #[error("out of buffer memory")]
    NoMemory,
    /// No memory manager has been attached to the link device
    #[error("memory manager not set")]
    NotReady,
    /// A blocking call was made from the periodic receive context
    #[error("operation would block the receive task")]
    WouldBlock,
    /// The co-processor did not finish initialization in time
    #[error("hardware initialization timed out")]
    Timeout,
}

/// Failure status reported by the control service
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("control service error {code}")]
pub struct ControlError {
    /// Raw status code of the control library
    pub code: i32,
}

impl ControlError {
    /// Generic failure, for callers that have no specific code
    pub const FAILED: Self = Self { code: -1 };

    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

impl From<ControlError> for NetError {
    fn from(_: ControlError) -> Self {
        NetError::DeviceError
    }
}
