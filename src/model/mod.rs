//! Device model: configuration and runtime status behind one lock.
//!
//! The control loop and the console thread both read and write the model,
//! so every field is reached through [`DeviceModel::read`] or
//! [`DeviceModel::update`], which hold a single critical-section mutex for
//! the duration of the closure. Closures must not call back into the model.

pub mod class;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::config::{DeviceConfig, FeedbackConfig, Message, message_from_str};
use crate::error::ValidationError;
use class::DeviceClass;

/// Plain snapshot of every model field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub address: u16,
    pub serial_number: u32,
    pub class: DeviceClass,
    pub feedback: FeedbackConfig,
    pub missing_heartbeat: bool,
    pub output_attempts_exceeded: bool,
    pub safety_bypass: bool,
    pub safety_message: Message,
    pub feedback_message: Message,
    pub work_seconds: u32,
    pub work_dirty: bool,
}

impl From<&DeviceConfig> for DeviceState {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            address: config.address,
            serial_number: config.serial_number,
            class: config.class,
            feedback: config.feedback,
            missing_heartbeat: false,
            output_attempts_exceeded: false,
            safety_bypass: false,
            safety_message: config.safety_message.clone(),
            feedback_message: config.feedback_message.clone(),
            work_seconds: config.work_seconds,
            work_dirty: false,
        }
    }
}

pub struct DeviceModel {
    inner: Mutex<CriticalSectionRawMutex, RefCell<DeviceState>>,
}

impl DeviceModel {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(DeviceState::from(config))),
        }
    }

    /// Run `f` with shared access to the state.
    pub fn read<R>(&self, f: impl FnOnce(&DeviceState) -> R) -> R {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    /// Run `f` with exclusive access to the state.
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn snapshot(&self) -> DeviceState {
        self.read(DeviceState::clone)
    }

    // ── Addressing ────────────────────────────────────────────

    pub fn address(&self) -> u16 {
        self.read(|s| s.address)
    }

    pub fn set_address(&self, address: u16) -> Result<(), ValidationError> {
        let address = DeviceConfig::validate_address(address)?;
        self.update(|s| s.address = address);
        Ok(())
    }

    pub fn serial_number(&self) -> u32 {
        self.read(|s| s.serial_number)
    }

    pub fn set_serial_number(&self, serial_number: u32) {
        self.update(|s| s.serial_number = serial_number);
    }

    /// Replace the upper 16 bits, returning the resulting serial number.
    pub fn set_serial_high(&self, high: u16) -> u32 {
        self.update(|s| {
            s.serial_number = (u32::from(high) << 16) | (s.serial_number & 0x0000_FFFF);
            s.serial_number
        })
    }

    /// Replace the lower 16 bits, returning the resulting serial number.
    pub fn set_serial_low(&self, low: u16) -> u32 {
        self.update(|s| {
            s.serial_number = (s.serial_number & 0xFFFF_0000) | u32::from(low);
            s.serial_number
        })
    }

    // ── Class ─────────────────────────────────────────────────

    pub fn class(&self) -> DeviceClass {
        self.read(|s| s.class)
    }

    /// Class as reported on the bus, hardware model included.
    pub fn class_register(&self) -> u16 {
        self.class().register_value()
    }

    /// Validate and correct `raw`; the stored class is untouched on error.
    pub fn set_class(&self, raw: u16) -> Result<DeviceClass, ValidationError> {
        let class = DeviceClass::correct(raw)?;
        self.update(|s| s.class = class);
        Ok(class)
    }

    // ── Feedback ──────────────────────────────────────────────

    pub fn feedback(&self) -> FeedbackConfig {
        self.read(|s| s.feedback)
    }

    pub fn set_feedback_enabled(&self, enabled: bool) {
        self.update(|s| s.feedback.enabled = enabled);
    }

    pub fn set_feedback_direction(&self, direction: u8) -> Result<(), ValidationError> {
        let direction = FeedbackConfig::validate_direction(direction)?;
        self.update(|s| s.feedback.direction = direction);
        Ok(())
    }

    pub fn set_output_attempts(&self, attempts: u8) -> Result<(), ValidationError> {
        let attempts = FeedbackConfig::validate_attempts(attempts)?;
        self.update(|s| s.feedback.attempts = attempts);
        Ok(())
    }

    pub fn set_feedback_delay(&self, delay_secs: u8) -> Result<(), ValidationError> {
        let delay_secs = FeedbackConfig::validate_delay(delay_secs)?;
        self.update(|s| s.feedback.delay_secs = delay_secs);
        Ok(())
    }

    // ── Runtime flags ─────────────────────────────────────────

    pub fn missing_heartbeat(&self) -> bool {
        self.read(|s| s.missing_heartbeat)
    }

    pub fn set_missing_heartbeat(&self, missing: bool) {
        self.update(|s| s.missing_heartbeat = missing);
    }

    pub fn output_attempts_exceeded(&self) -> bool {
        self.read(|s| s.output_attempts_exceeded)
    }

    pub fn set_output_attempts_exceeded(&self, exceeded: bool) {
        self.update(|s| s.output_attempts_exceeded = exceeded);
    }

    pub fn safety_bypass(&self) -> bool {
        self.read(|s| s.safety_bypass)
    }

    pub fn set_safety_bypass(&self, bypass: bool) {
        self.update(|s| s.safety_bypass = bypass);
    }

    // ── Messages ──────────────────────────────────────────────

    pub fn safety_message(&self) -> Message {
        self.read(|s| s.safety_message.clone())
    }

    pub fn set_safety_message(&self, text: &str) -> Message {
        let message = message_from_str(text);
        self.update(|s| s.safety_message = message.clone());
        message
    }

    pub fn feedback_message(&self) -> Message {
        self.read(|s| s.feedback_message.clone())
    }

    pub fn set_feedback_message(&self, text: &str) -> Message {
        let message = message_from_str(text);
        self.update(|s| s.feedback_message = message.clone());
        message
    }

    // ── Work time ─────────────────────────────────────────────

    pub fn work_seconds(&self) -> u32 {
        self.read(|s| s.work_seconds)
    }

    pub fn work_hours(&self) -> u16 {
        (self.work_seconds() / 3600).min(u32::from(u16::MAX)) as u16
    }

    /// Accumulate on-time and request persistence.
    pub fn add_work_seconds(&self, seconds: u32) {
        self.update(|s| {
            s.work_seconds = s.work_seconds.saturating_add(seconds);
            s.work_dirty = true;
        });
    }

    pub fn reset_work_seconds(&self) {
        self.update(|s| {
            s.work_seconds = 0;
            s.work_dirty = true;
        });
    }

    pub fn work_dirty(&self) -> bool {
        self.read(|s| s.work_dirty)
    }

    /// Clear the dirty flag, returning the seconds to persist if it was set.
    pub fn take_dirty_work_seconds(&self) -> Option<u32> {
        self.update(|s| {
            if s.work_dirty {
                s.work_dirty = false;
                Some(s.work_seconds)
            } else {
                None
            }
        })
    }
}
