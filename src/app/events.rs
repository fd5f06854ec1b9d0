//! Outbound application events.
//!
//! The relay state machine, dispatcher and controller emit these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them: log to serial, append to the event
//! log exposed over the bus, or both.

use crate::error::SafetyFault;
use crate::relay::RelayState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The controller has started.
    Started,

    /// The relay state machine changed state.
    StateChanged { from: RelayState, to: RelayState },

    /// The physical output was switched.
    OutputChanged { energized: bool },

    /// A feedback check failed and a retry was scheduled.
    FeedbackRetry { attempt: u8 },

    /// A safety condition forced or kept the output off.
    SafetyFault(SafetyFault),

    /// A heartbeat arrived after the timeout had expired.
    HeartbeatRestored,

    /// The bus address changed (register write or CONFIG_ADDRESS).
    AddressChanged(u16),

    /// Accumulated work seconds were persisted.
    WorkTimeSaved(u32),
}
