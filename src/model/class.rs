//! Device class packing.
//!
//! ```text
//!  15      12 11       8 7                0
//! ┌──────────┬──────────┬──────────────────┐
//! │ hw model │   mode   │      group       │
//! └──────────┴──────────┴──────────────────┘
//! ```
//!
//! Only the lower twelve bits are configurable and stored. The hardware
//! model nibble is OR'd in whenever the class is reported on the bus.

use serde::{Deserialize, Serialize};

use crate::config::HARDWARE_MODEL;
use crate::error::ValidationError;

/// Bits of the class register a master may change.
pub const CLASS_CONFIGURABLE_MASK: u16 = 0x0FFF;

/// Behavioral profile selected by the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeviceMode {
    Light = 1,
    Uvc = 2,
    Esf = 3,
    Gas = 4,
    Safety = 5,
}

impl DeviceMode {
    pub const ALL: [DeviceMode; 5] = [
        DeviceMode::Light,
        DeviceMode::Uvc,
        DeviceMode::Esf,
        DeviceMode::Gas,
        DeviceMode::Safety,
    ];

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Light),
            2 => Some(Self::Uvc),
            3 => Some(Self::Esf),
            4 => Some(Self::Gas),
            5 => Some(Self::Safety),
            _ => None,
        }
    }

    /// UV lamps and extraction fans may only run with the interlock closed,
    /// and they are the modes whose activation is verified by feedback.
    pub const fn is_supervised(self) -> bool {
        matches!(self, Self::Uvc | Self::Esf)
    }
}

/// A validated device class. The decoded mode is always one of [`DeviceMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct DeviceClass(u16);

impl DeviceClass {
    pub const fn new(mode: DeviceMode, group: u8) -> Self {
        Self(((mode as u16) << 8) | group as u16)
    }

    /// Strip the non-configurable bits, then accept the value only if the
    /// remaining mode nibble names a known mode.
    pub fn correct(raw: u16) -> Result<Self, ValidationError> {
        let corrected = raw & CLASS_CONFIGURABLE_MASK;
        match DeviceMode::from_bits((corrected >> 8) as u8) {
            Some(_) => Ok(Self(corrected)),
            None => Err(ValidationError::Class(raw)),
        }
    }

    pub fn mode(self) -> DeviceMode {
        // The constructor paths guarantee a known mode nibble.
        DeviceMode::from_bits((self.0 >> 8) as u8 & 0x0F).unwrap_or(DeviceMode::Light)
    }

    pub const fn group(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Stored value, without the hardware model.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Value reported on the bus.
    pub const fn register_value(self) -> u16 {
        self.0 | (HARDWARE_MODEL << 12)
    }
}

impl TryFrom<u16> for DeviceClass {
    type Error = ValidationError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::correct(raw)
    }
}

impl From<DeviceClass> for u16 {
    fn from(class: DeviceClass) -> Self {
        class.bits()
    }
}
