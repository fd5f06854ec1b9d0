//! Persistence of the device configuration.
//!
//! Each field lives under its own key in the `"minion"` namespace so a
//! single write never rewrites unrelated settings. Scalars are stored
//! little-endian, messages as raw UTF-8 blobs.
//!
//! The `save_*` helpers validate first, then update the model, then
//! persist. A storage failure is logged and the model keeps the new value:
//! the setting takes effect now and is lost on the next reboot.

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::config::{DeviceConfig, FeedbackConfig, MESSAGE_SIZE, Message, message_from_str};
use crate::error::ValidationError;
use crate::model::DeviceModel;
use crate::model::class::DeviceClass;

pub const NAMESPACE: &str = "minion";

pub const KEY_ADDRESS: &str = "address";
pub const KEY_SERIAL: &str = "serial";
pub const KEY_CLASS: &str = "class";
pub const KEY_FEEDBACK_ENABLE: &str = "fb_enable";
pub const KEY_FEEDBACK_DIRECTION: &str = "fb_dir";
pub const KEY_OUTPUT_ATTEMPTS: &str = "fb_attempts";
pub const KEY_FEEDBACK_DELAY: &str = "fb_delay";
pub const KEY_SAFETY_MESSAGE: &str = "safety_msg";
pub const KEY_FEEDBACK_MESSAGE: &str = "fb_msg";
pub const KEY_WORK_SECONDS: &str = "work_secs";

// ───────────────────────────────────────────────────────────────
// Loading
// ───────────────────────────────────────────────────────────────

/// Defaults overlaid with whatever the store holds.
pub fn load(storage: &dyn StoragePort) -> DeviceConfig {
    let mut cfg = DeviceConfig::default();

    if let Some(v) = load_u16(storage, KEY_ADDRESS) {
        overlay(KEY_ADDRESS, DeviceConfig::validate_address(v), |v| cfg.address = v);
    }
    if let Some(v) = load_u32(storage, KEY_SERIAL) {
        cfg.serial_number = v;
    }
    if let Some(v) = load_u16(storage, KEY_CLASS) {
        overlay(KEY_CLASS, DeviceClass::correct(v), |v| cfg.class = v);
    }
    if let Some(v) = load_u8(storage, KEY_FEEDBACK_ENABLE) {
        cfg.feedback.enabled = v != 0;
    }
    if let Some(v) = load_u8(storage, KEY_FEEDBACK_DIRECTION) {
        overlay(
            KEY_FEEDBACK_DIRECTION,
            FeedbackConfig::validate_direction(v),
            |v| cfg.feedback.direction = v,
        );
    }
    if let Some(v) = load_u8(storage, KEY_OUTPUT_ATTEMPTS) {
        overlay(
            KEY_OUTPUT_ATTEMPTS,
            FeedbackConfig::validate_attempts(v),
            |v| cfg.feedback.attempts = v,
        );
    }
    if let Some(v) = load_u8(storage, KEY_FEEDBACK_DELAY) {
        overlay(
            KEY_FEEDBACK_DELAY,
            FeedbackConfig::validate_delay(v),
            |v| cfg.feedback.delay_secs = v,
        );
    }
    if let Some(m) = load_message(storage, KEY_SAFETY_MESSAGE) {
        cfg.safety_message = m;
    }
    if let Some(m) = load_message(storage, KEY_FEEDBACK_MESSAGE) {
        cfg.feedback_message = m;
    }
    if let Some(v) = load_u32(storage, KEY_WORK_SECONDS) {
        cfg.work_seconds = v;
    }

    info!(
        "Configuration: address={} serial={} class=0x{:04X}",
        cfg.address,
        cfg.serial_number,
        cfg.class.bits()
    );
    cfg
}

fn overlay<T>(key: &str, value: Result<T, ValidationError>, apply: impl FnOnce(T)) {
    match value {
        Ok(v) => apply(v),
        Err(e) => warn!("Configuration: ignoring stored {}: {}", key, e),
    }
}

fn load_bytes<const N: usize>(storage: &dyn StoragePort, key: &str) -> Option<[u8; N]> {
    let mut buf = [0u8; N];
    match storage.read(NAMESPACE, key, &mut buf) {
        Ok(len) if len == N => Some(buf),
        Ok(len) => {
            warn!("Configuration: {} has {} bytes, expected {}", key, len, N);
            None
        }
        Err(StorageError::NotFound) => None,
        Err(e) => {
            warn!("Configuration: reading {} failed: {}", key, e);
            None
        }
    }
}

fn load_u8(storage: &dyn StoragePort, key: &str) -> Option<u8> {
    load_bytes::<1>(storage, key).map(|b| b[0])
}

fn load_u16(storage: &dyn StoragePort, key: &str) -> Option<u16> {
    load_bytes::<2>(storage, key).map(u16::from_le_bytes)
}

fn load_u32(storage: &dyn StoragePort, key: &str) -> Option<u32> {
    load_bytes::<4>(storage, key).map(u32::from_le_bytes)
}

fn load_message(storage: &dyn StoragePort, key: &str) -> Option<Message> {
    let mut buf = [0u8; MESSAGE_SIZE];
    let len = storage.read(NAMESPACE, key, &mut buf).ok()?;
    match core::str::from_utf8(&buf[..len]) {
        Ok(text) => Some(message_from_str(text)),
        Err(_) => {
            warn!("Configuration: {} is not valid UTF-8", key);
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Saving
// ───────────────────────────────────────────────────────────────

fn persist(storage: &mut dyn StoragePort, key: &str, bytes: &[u8]) {
    if let Err(e) = storage.write(NAMESPACE, key, bytes) {
        warn!("Configuration: failed to persist {}: {}", key, e);
    }
}

pub fn save_address(
    storage: &mut dyn StoragePort,
    model: &DeviceModel,
    address: u16,
) -> Result<(), ValidationError> {
    model.set_address(address)?;
    persist(storage, KEY_ADDRESS, &address.to_le_bytes());
    info!("Configuration: address set to {}", address);
    Ok(())
}

pub fn save_serial_number(storage: &mut dyn StoragePort, model: &DeviceModel, serial: u32) {
    model.set_serial_number(serial);
    persist(storage, KEY_SERIAL, &serial.to_le_bytes());
}

/// Only the corrected value reaches the store, and only on acceptance.
pub fn save_class(
    storage: &mut dyn StoragePort,
    model: &DeviceModel,
    raw: u16,
) -> Result<DeviceClass, ValidationError> {
    let class = model.set_class(raw)?;
    persist(storage, KEY_CLASS, &class.bits().to_le_bytes());
    info!("Configuration: class set to 0x{:04X}", class.bits());
    Ok(class)
}

pub fn save_feedback_enabled(storage: &mut dyn StoragePort, model: &DeviceModel, enabled: bool) {
    model.set_feedback_enabled(enabled);
    persist(storage, KEY_FEEDBACK_ENABLE, &[u8::from(enabled)]);
}

pub fn save_feedback_direction(
    storage: &mut dyn StoragePort,
    model: &DeviceModel,
    direction: u8,
) -> Result<(), ValidationError> {
    model.set_feedback_direction(direction)?;
    persist(storage, KEY_FEEDBACK_DIRECTION, &[direction]);
    Ok(())
}

pub fn save_output_attempts(
    storage: &mut dyn StoragePort,
    model: &DeviceModel,
    attempts: u8,
) -> Result<(), ValidationError> {
    model.set_output_attempts(attempts)?;
    persist(storage, KEY_OUTPUT_ATTEMPTS, &[attempts]);
    Ok(())
}

pub fn save_feedback_delay(
    storage: &mut dyn StoragePort,
    model: &DeviceModel,
    delay_secs: u8,
) -> Result<(), ValidationError> {
    model.set_feedback_delay(delay_secs)?;
    persist(storage, KEY_FEEDBACK_DELAY, &[delay_secs]);
    Ok(())
}

/// Stores the message truncated to the register block size.
pub fn save_safety_message(storage: &mut dyn StoragePort, model: &DeviceModel, text: &str) -> Message {
    let stored = model.set_safety_message(text);
    persist(storage, KEY_SAFETY_MESSAGE, stored.as_bytes());
    stored
}

pub fn save_feedback_message(storage: &mut dyn StoragePort, model: &DeviceModel, text: &str) -> Message {
    let stored = model.set_feedback_message(text);
    persist(storage, KEY_FEEDBACK_MESSAGE, stored.as_bytes());
    stored
}

pub fn save_work_seconds(storage: &mut dyn StoragePort, seconds: u32) {
    persist(storage, KEY_WORK_SECONDS, &seconds.to_le_bytes());
}
