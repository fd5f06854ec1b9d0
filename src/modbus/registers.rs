//! Register map of the relay minion.
//!
//! ```text
//!   holding   0  address            R/W
//!             1  firmware version   R
//!             2  class              R/W   (hardware model OR'd in)
//!             3  serial high        R/W
//!             4  serial low         R/W
//!             5  alarms             R
//!             6  relay state        R
//!             7  event-log count    R
//!         8..136 event log          R     32 entries × 4 registers
//!       136..152 safety message     R     32 bytes
//!       152..168 feedback message   R     32 bytes
//!           256  work hours         R/W   (any write resets)
//!
//!   coils     0  relay              1  safety bypass
//!   inputs    0  safety line        1  feedback signal
//! ```
//!
//! Holding registers outside the map read as zero and refuse writes.
//! Every coil reads the output level; writes to unused coils are ignored.

use crate::config::{
    EVENT_LOG_CAPACITY, FIRMWARE_VERSION_MAJOR, FIRMWARE_VERSION_MINOR, FIRMWARE_VERSION_PATCH,
    MESSAGE_SIZE,
};
use crate::error::ValidationError;
use crate::event_log::EVENT_ENTRY_SIZE;

pub const HR_ADDRESS: u16 = 0;
pub const HR_FIRMWARE_VERSION: u16 = 1;
pub const HR_CLASS: u16 = 2;
pub const HR_SERIAL_HIGH: u16 = 3;
pub const HR_SERIAL_LOW: u16 = 4;
pub const HR_ALARMS: u16 = 5;
pub const HR_STATE: u16 = 6;
pub const HR_LOG_COUNT: u16 = 7;
pub const HR_LOGS: u16 = 8;

pub const LOG_ENTRY_REGISTERS: u16 = (EVENT_ENTRY_SIZE / 2) as u16;
pub const MESSAGE_REGISTERS: u16 = (MESSAGE_SIZE / 2) as u16;

pub const HR_SAFETY_MESSAGE: u16 = HR_LOGS + EVENT_LOG_CAPACITY as u16 * LOG_ENTRY_REGISTERS;
pub const HR_FEEDBACK_MESSAGE: u16 = HR_SAFETY_MESSAGE + MESSAGE_REGISTERS;
const HR_MESSAGES_END: u16 = HR_FEEDBACK_MESSAGE + MESSAGE_REGISTERS;

pub const HR_WORK_HOURS: u16 = 256;

pub const COIL_RELAY: u16 = 0;
pub const COIL_SAFETY_BYPASS: u16 = 1;

pub const INPUT_SAFETY: u16 = 0;
pub const INPUT_SIGNAL: u16 = 1;

pub const ALARM_SAFETY: u16 = 0x01;
pub const ALARM_ATTEMPTS_EXCEEDED: u16 = 0x02;

/// Firmware version packed as `major << 11 | minor << 6 | patch`.
pub const fn firmware_version() -> u16 {
    (FIRMWARE_VERSION_MAJOR << 11) | (FIRMWARE_VERSION_MINOR << 6) | FIRMWARE_VERSION_PATCH
}

/// Decoded holding-register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingRegister {
    Address,
    FirmwareVersion,
    Class,
    SerialHigh,
    SerialLow,
    Alarms,
    State,
    LogCount,
    /// Word `word` (0..4) of event-log entry `entry`.
    Log { entry: usize, word: usize },
    SafetyMessage(usize),
    FeedbackMessage(usize),
    WorkHours,
}

impl HoldingRegister {
    pub fn from_index(index: u16) -> Result<Self, ValidationError> {
        let reg = match index {
            HR_ADDRESS => Self::Address,
            HR_FIRMWARE_VERSION => Self::FirmwareVersion,
            HR_CLASS => Self::Class,
            HR_SERIAL_HIGH => Self::SerialHigh,
            HR_SERIAL_LOW => Self::SerialLow,
            HR_ALARMS => Self::Alarms,
            HR_STATE => Self::State,
            HR_LOG_COUNT => Self::LogCount,
            i if (HR_LOGS..HR_SAFETY_MESSAGE).contains(&i) => {
                let offset = i - HR_LOGS;
                Self::Log {
                    entry: usize::from(offset / LOG_ENTRY_REGISTERS),
                    word: usize::from(offset % LOG_ENTRY_REGISTERS),
                }
            }
            i if (HR_SAFETY_MESSAGE..HR_FEEDBACK_MESSAGE).contains(&i) => {
                Self::SafetyMessage(usize::from(i - HR_SAFETY_MESSAGE))
            }
            i if (HR_FEEDBACK_MESSAGE..HR_MESSAGES_END).contains(&i) => {
                Self::FeedbackMessage(usize::from(i - HR_FEEDBACK_MESSAGE))
            }
            HR_WORK_HOURS => Self::WorkHours,
            _ => return Err(ValidationError::RegisterIndex(index)),
        };
        Ok(reg)
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Self::Address | Self::Class | Self::SerialHigh | Self::SerialLow | Self::WorkHours
        )
    }
}

/// Big-endian word `word` of a byte string, zero padded.
pub fn packed_word(bytes: &[u8], word: usize) -> u16 {
    let hi = bytes.get(word * 2).copied().unwrap_or(0);
    let lo = bytes.get(word * 2 + 1).copied().unwrap_or(0);
    u16::from_be_bytes([hi, lo])
}
