//! Unified error types for the relay minion firmware.
//!
//! Every fallible operation funnels into [`Error`]. All variants are `Copy`
//! so they pass through the dispatcher and the relay state machine without
//! allocation. Safety conditions are not errors of the process: they are
//! state-machine outcomes, reported here only so callers can tell why a
//! command was refused.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A value or request was rejected before any state changed.
    Validation(ValidationError),
    /// A bus frame was unusable.
    Protocol(ProtocolError),
    /// The relay refused to energize.
    Safety(SafetyFault),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Startup failure. The only class allowed to abort the process.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Class value whose decoded mode is unknown.
    Class(u16),
    Address(u16),
    FeedbackDirection(u8),
    OutputAttempts(u8),
    FeedbackDelay(u8),
    /// Custom-function payload shorter than required.
    PayloadTooShort { expected: usize, actual: usize },
    /// Register, coil or input index outside the map.
    RegisterIndex(u16),
    /// Register not writable.
    ReadOnly(u16),
    /// Request quantity outside protocol limits.
    Quantity(u16),
    /// Value not representable for the target (e.g. coil value other than 0x0000/0xFF00).
    Value(u16),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(v) => write!(f, "invalid class 0x{v:04X}"),
            Self::Address(v) => write!(f, "invalid address {v}"),
            Self::FeedbackDirection(v) => write!(f, "invalid feedback direction {v}"),
            Self::OutputAttempts(v) => write!(f, "invalid activation attempts {v}"),
            Self::FeedbackDelay(v) => write!(f, "invalid feedback delay {v}"),
            Self::PayloadTooShort { expected, actual } => {
                write!(f, "payload too short ({actual} < {expected})")
            }
            Self::RegisterIndex(i) => write!(f, "no register at index {i}"),
            Self::ReadOnly(i) => write!(f, "register {i} is read-only"),
            Self::Quantity(q) => write!(f, "invalid quantity {q}"),
            Self::Value(v) => write!(f, "invalid value 0x{v:04X}"),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// Unusable frames. Frequent on a shared multidrop bus; never a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than address + function + CRC.
    FrameTooShort(usize),
    /// More bytes than an RTU ADU can hold.
    FrameTooLong(usize),
    CrcMismatch { expected: u16, received: u16 },
    /// PDU body shorter than its function code requires.
    Truncated { function: u8 },
    /// Byte count field disagrees with the data that follows.
    ByteCountMismatch { function: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooShort(n) => write!(f, "frame too short ({n} bytes)"),
            Self::FrameTooLong(n) => write!(f, "frame too long ({n} bytes)"),
            Self::CrcMismatch { expected, received } => {
                write!(f, "CRC mismatch (expected 0x{expected:04X}, got 0x{received:04X})")
            }
            Self::Truncated { function } => write!(f, "truncated PDU for function {function}"),
            Self::ByteCountMismatch { function } => {
                write!(f, "byte count mismatch for function {function}")
            }
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Conditions that keep or force the output off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// Safety line open and not bypassed.
    InterlockOpen = 0b0000_0001,
    /// No heartbeat from the bus master within the timeout.
    HeartbeatLost = 0b0000_0010,
    /// Every activation attempt failed its feedback check.
    FeedbackExhausted = 0b0000_0100,
}

impl SafetyFault {
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterlockOpen => write!(f, "safety interlock open"),
            Self::HeartbeatLost => write!(f, "heartbeat lost"),
            Self::FeedbackExhausted => write!(f, "feedback attempts exhausted"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Modbus exception codes
// ---------------------------------------------------------------------------

/// Exception code carried by a `function | 0x80` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
}

impl ModbusException {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "illegal function"),
            Self::IllegalDataAddress => write!(f, "illegal data address"),
            Self::IllegalDataValue => write!(f, "illegal data value"),
            Self::SlaveDeviceFailure => write!(f, "slave device failure"),
        }
    }
}

impl From<ValidationError> for ModbusException {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::RegisterIndex(_) => Self::IllegalDataAddress,
            ValidationError::ReadOnly(_) => Self::IllegalFunction,
            _ => Self::IllegalDataValue,
        }
    }
}

impl From<SafetyFault> for ModbusException {
    fn from(_: SafetyFault) -> Self {
        Self::SlaveDeviceFailure
    }
}

impl From<StorageError> for ModbusException {
    fn from(_: StorageError) -> Self {
        Self::SlaveDeviceFailure
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
