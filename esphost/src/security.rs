//! # Security Mode Translation
//!
//! The host stack and the co-processor each have their own notion of a
//! network's security. [`Security`] is what applications pass to
//! `connect`/`set_credentials` and what scans report; [`EncryptionMode`] is the
//! authentication mode carried in co-processor commands and scan records.
//!
//! The eight modes both sides know about map one-to-one. Anything else
//! (enterprise EAP flavours on the host side, WAPI or an unknown code on the
//! co-processor side) falls back to WPA/WPA2 mixed mode, which is what the
//! co-processor negotiates best with when it is unsure.

use serde::{Deserialize, Serialize};

/// Security type as seen by the host network stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Security {
    /// Open network
    None,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Pap,
    Chap,
    EapTls,
    Peap,
    Wpa2Enterprise,
    Wpa3,
    Wpa3Wpa2,
    #[default]
    Unknown,
}

impl Security {
    /// Whether this mode needs a passphrase
    pub fn requires_passphrase(self) -> bool {
        self != Security::None
    }
}

/// Authentication mode understood by the co-processor firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EncryptionMode {
    #[default]
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
    Wpa2Enterprise = 5,
    Wpa3Psk = 6,
    Wpa2Wpa3Psk = 7,
    WapiPsk = 8,
    /// Code not known to this driver
    Unknown = 0xFF,
}

impl EncryptionMode {
    /// Raw code as sent to the co-processor
    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

impl From<u8> for EncryptionMode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Wep,
            2 => Self::WpaPsk,
            3 => Self::Wpa2Psk,
            4 => Self::WpaWpa2Psk,
            5 => Self::Wpa2Enterprise,
            6 => Self::Wpa3Psk,
            7 => Self::Wpa2Wpa3Psk,
            8 => Self::WapiPsk,
            _ => Self::Unknown,
        }
    }
}

impl From<Security> for EncryptionMode {
    fn from(security: Security) -> Self {
        match security {
            Security::None => EncryptionMode::Open,
            Security::Wep => EncryptionMode::Wep,
            Security::Wpa => EncryptionMode::WpaPsk,
            Security::WpaWpa2 => EncryptionMode::WpaWpa2Psk,
            Security::Wpa2 => EncryptionMode::Wpa2Psk,
            Security::Wpa2Enterprise => EncryptionMode::Wpa2Enterprise,
            Security::Wpa3Wpa2 => EncryptionMode::Wpa2Wpa3Psk,
            Security::Wpa3 => EncryptionMode::Wpa3Psk,
            Security::Pap
            | Security::Chap
            | Security::EapTls
            | Security::Peap
            | Security::Unknown => EncryptionMode::WpaWpa2Psk,
        }
    }
}

impl From<EncryptionMode> for Security {
    fn from(mode: EncryptionMode) -> Self {
        match mode {
            EncryptionMode::Open => Security::None,
            EncryptionMode::Wep => Security::Wep,
            EncryptionMode::WpaPsk => Security::Wpa,
            EncryptionMode::WpaWpa2Psk => Security::WpaWpa2,
            EncryptionMode::Wpa2Psk => Security::Wpa2,
            EncryptionMode::Wpa2Wpa3Psk => Security::Wpa3Wpa2,
            EncryptionMode::Wpa2Enterprise => Security::Wpa2Enterprise,
            EncryptionMode::Wpa3Psk => Security::Wpa3,
            EncryptionMode::WapiPsk | EncryptionMode::Unknown => Security::WpaWpa2,
        }
    }
}
