//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller / Dispatcher / RelayStateMachine
//! ```
//!
//! Driven adapters (digital I/O, RS-485 bus, storage, clock, event log)
//! implement these traits. The domain core consumes them through generics
//! or `&mut dyn` references and never touches hardware directly.

use crate::event_log::EVENT_ENTRY_SIZE;

use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Digital inputs (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Safety and feedback lines, plus any further discrete inputs.
pub trait SignalPort {
    /// Sample the physical lines. Returns `true` when a debounced level
    /// changed since the previous call.
    fn poll(&mut self) -> bool;

    /// Safety interlock asserted.
    fn safety_ok(&self) -> bool;

    /// Level of the activation-feedback line.
    fn signal_level(&self) -> bool;

    /// Discrete input by index (0 = safety, 1 = signal). `None` outside the map.
    fn input(&self, index: u16) -> Option<bool>;
}

// ───────────────────────────────────────────────────────────────
// Relay output (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait RelayOutputPort {
    fn set_output(&mut self, energized: bool);

    /// Physical output level as last driven.
    fn output_level(&self) -> bool;
}

/// Everything the relay state machine needs from the board.
pub trait RelayIo: SignalPort + RelayOutputPort {}

impl<T: SignalPort + RelayOutputPort> RelayIo for T {}

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond time source.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

/// Wall-clock setter used by the SET_TIME function.
pub trait RtcPort {
    fn set_unix_time(&mut self, unix_secs: u64) -> Result<(), RtcError>;
}

// ───────────────────────────────────────────────────────────────
// RS-485 bus
// ───────────────────────────────────────────────────────────────

/// Half-duplex byte transport to the bus master. Never blocks.
pub trait BusPort {
    /// Copy whatever bytes are pending into `buf`, returning the count.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Transmit a complete frame.
    fn write(&mut self, frame: &[u8]) -> Result<(), BusError>;
}

// ───────────────────────────────────────────────────────────────
// Status indicators
// ───────────────────────────────────────────────────────────────

/// What an indicator LED should be doing. The driver renders it against
/// the loop clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedPattern {
    #[default]
    Off,
    Solid,
    /// 1 Hz, half duty.
    SlowBlink,
    /// 4 Hz, half duty.
    FastBlink,
    /// Two short flashes, then a pause; 1 s cycle.
    DoubleBlink,
}

pub trait IndicatorPort {
    /// Bus link: solid while the master's heartbeat arrives.
    fn set_communication(&mut self, pattern: LedPattern, now_ms: u64);

    /// Output: solid while energized and healthy, blinking on faults.
    fn set_activity(&mut self, pattern: LedPattern, now_ms: u64);
}

// ───────────────────────────────────────────────────────────────
// Events
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

/// Read side of the event log, exposed through holding registers.
pub trait EventLogPort {
    fn count(&self) -> u16;

    /// Fixed-size big-endian encoding of the entry at `index` (oldest first).
    fn serialize(&self, index: usize) -> Option<[u8; EVENT_ENTRY_SIZE]>;
}

/// An event sink that also keeps a readable log.
pub trait Journal: EventSink + EventLogPort {
    fn as_sink(&mut self) -> &mut dyn EventSink;
}

impl<T: EventSink + EventLogPort> Journal for T {
    fn as_sink(&mut self) -> &mut dyn EventSink {
        self
    }
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced. Writes MUST be atomic: no partial writes on power
/// loss. The ESP-IDF NVS API guarantees this natively; the in-memory
/// simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored bytes could not be decoded.
    Corrupted,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "stored value corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    /// Timestamp cannot be represented by the platform clock.
    OutOfRange,
    /// The platform call failed.
    SetFailed(i32),
}

impl core::fmt::Display for RtcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "timestamp out of range"),
            Self::SetFailed(rc) => write!(f, "settimeofday failed (rc={})", rc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Frame larger than the transmit buffer.
    Overflow,
    /// UART driver error.
    WriteFailed(i32),
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Overflow => write!(f, "frame too large"),
            Self::WriteFailed(rc) => write!(f, "UART write failed (rc={})", rc),
        }
    }
}
