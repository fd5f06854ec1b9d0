//! Device configuration parameters
//!
//! Compile-time constants for the relay minion plus the persisted
//! configuration snapshot that seeds the [`DeviceModel`](crate::model::DeviceModel)
//! at boot. Stored values are overlaid onto [`DeviceConfig::default()`] by
//! [`configuration::load`](crate::app::configuration::load).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::class::{DeviceClass, DeviceMode};

// --- Firmware identity ---

pub const FIRMWARE_VERSION_MAJOR: u16 = 3;
pub const FIRMWARE_VERSION_MINOR: u16 = 0;
pub const FIRMWARE_VERSION_PATCH: u16 = 2;

/// Hardware model nibble reported in the top four bits of the class register.
pub const HARDWARE_MODEL: u16 = 0x1;

// --- Defaults ---

pub const DEFAULT_ADDRESS: u16 = 1;
pub const DEFAULT_SERIAL_NUMBER: u32 = 2;
pub const DEFAULT_CLASS: DeviceClass = DeviceClass::new(DeviceMode::Light, 1);
pub const DEFAULT_FEEDBACK_ENABLED: bool = true;
pub const DEFAULT_FEEDBACK_DIRECTION: u8 = 0;
pub const DEFAULT_OUTPUT_ATTEMPTS: u8 = 1;
pub const DEFAULT_FEEDBACK_DELAY_SECS: u8 = 4;

// --- Limits ---

pub const MAX_FEEDBACK_DIRECTION: u8 = 1;
pub const MAX_OUTPUT_ATTEMPTS: u8 = 8;
pub const MAX_FEEDBACK_DELAY_SECS: u8 = 8;
/// Highest unicast bus address (one byte on the wire).
pub const MAX_ADDRESS: u16 = 255;
/// Safety and feedback messages, in bytes.
pub const MESSAGE_SIZE: usize = 32;

// --- Timing ---

/// Missing heartbeat threshold.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
/// Accumulated work seconds are persisted at most this often.
pub const WORK_SAVE_INTERVAL_MS: u64 = 60_000;
pub const CONTROL_LOOP_PERIOD_MS: u32 = 1;
/// Upper bound of the random delay before answering a discovery request.
pub const RANDOM_REPLY_WINDOW_MS: u32 = 1_000;
/// Consecutive identical samples before an input level is accepted.
pub const INPUT_DEBOUNCE_SAMPLES: u8 = 5;
pub const WATCHDOG_TIMEOUT_MS: u32 = 10_000;

// --- Bus ---

pub const BUS_BAUD_RATE: u32 = 115_200;

// --- Event log ---

pub const EVENT_LOG_CAPACITY: usize = 32;

/// Bounded text stored in the device model and exposed through registers.
pub type Message = heapless::String<MESSAGE_SIZE>;

/// Build a [`Message`], truncating on a char boundary when `text` is too long.
pub fn message_from_str(text: &str) -> Message {
    let mut end = text.len().min(MESSAGE_SIZE);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut message = Message::new();
    // Cannot fail: `end` never exceeds the capacity.
    let _ = message.push_str(&text[..end]);
    message
}

/// Activation-feedback parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub enabled: bool,
    /// Expected signal level (0 = low, 1 = high) once the load responded.
    pub direction: u8,
    /// Energize attempts per activation cycle.
    pub attempts: u8,
    /// Seconds between energizing and checking the signal.
    pub delay_secs: u8,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_FEEDBACK_ENABLED,
            direction: DEFAULT_FEEDBACK_DIRECTION,
            attempts: DEFAULT_OUTPUT_ATTEMPTS,
            delay_secs: DEFAULT_FEEDBACK_DELAY_SECS,
        }
    }
}

impl FeedbackConfig {
    pub fn validate_direction(direction: u8) -> Result<u8, ValidationError> {
        if direction > MAX_FEEDBACK_DIRECTION {
            return Err(ValidationError::FeedbackDirection(direction));
        }
        Ok(direction)
    }

    pub fn validate_attempts(attempts: u8) -> Result<u8, ValidationError> {
        if !(1..=MAX_OUTPUT_ATTEMPTS).contains(&attempts) {
            return Err(ValidationError::OutputAttempts(attempts));
        }
        Ok(attempts)
    }

    pub fn validate_delay(delay_secs: u8) -> Result<u8, ValidationError> {
        if !(1..=MAX_FEEDBACK_DELAY_SECS).contains(&delay_secs) {
            return Err(ValidationError::FeedbackDelay(delay_secs));
        }
        Ok(delay_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::validate_direction(self.direction)?;
        Self::validate_attempts(self.attempts)?;
        Self::validate_delay(self.delay_secs)?;
        Ok(())
    }

    /// Signal level that proves the load responded.
    pub fn expected_level(&self) -> bool {
        self.direction != 0
    }

    pub fn delay_ms(&self) -> u64 {
        u64::from(self.delay_secs) * 1000
    }
}

/// Persisted device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: u16,
    pub serial_number: u32,
    pub class: DeviceClass,
    pub feedback: FeedbackConfig,
    pub safety_message: Message,
    pub feedback_message: Message,
    pub work_seconds: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            serial_number: DEFAULT_SERIAL_NUMBER,
            class: DEFAULT_CLASS,
            feedback: FeedbackConfig::default(),
            safety_message: Message::new(),
            feedback_message: Message::new(),
            work_seconds: 0,
        }
    }
}

impl DeviceConfig {
    pub fn validate_address(address: u16) -> Result<u16, ValidationError> {
        if !(1..=MAX_ADDRESS).contains(&address) {
            return Err(ValidationError::Address(address));
        }
        Ok(address)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::validate_address(self.address)?;
        self.feedback.validate()
    }
}
