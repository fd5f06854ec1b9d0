//! Data threaded through every relay state handler.
//!
//! [`RelayCore`] is owned by the state machine and survives across events:
//! attempt counter, activation timestamp and the two timer slots.
//! [`RelayEnv`] is assembled by the caller for a single event and borrows
//! the device model, the board I/O and the event sink.

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, RelayIo};
use crate::model::DeviceModel;
use crate::timer::TimerSlot;

/// Synthetic events produced by the timer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayTimer {
    /// Re-energize after a failed feedback check.
    Retry,
    /// Compare the feedback signal against the expected level.
    CheckFeedback,
}

/// State owned by the relay state machine.
#[derive(Debug, Default)]
pub struct RelayCore {
    /// Failed feedback cycles since the last successful activation.
    pub attempts: u8,
    /// Uptime at which a supervised output was energized.
    pub activation_ms: Option<u64>,
    pub check_timer: TimerSlot<RelayTimer>,
    pub retry_timer: TimerSlot<RelayTimer>,
}

impl RelayCore {
    pub fn disarm_timers(&mut self) {
        self.check_timer.disarm();
        self.retry_timer.disarm();
    }
}

/// Borrowed collaborators for one state-machine operation.
pub struct RelayEnv<'a> {
    pub model: &'a DeviceModel,
    pub io: &'a mut dyn RelayIo,
    pub sink: &'a mut dyn EventSink,
    pub now_ms: u64,
}

impl<'a> RelayEnv<'a> {
    pub fn new(
        model: &'a DeviceModel,
        io: &'a mut dyn RelayIo,
        sink: &'a mut dyn EventSink,
        now_ms: u64,
    ) -> Self {
        Self {
            model,
            io,
            sink,
            now_ms,
        }
    }

    /// Drive the output, reporting actual level changes.
    pub fn energize(&mut self, on: bool) {
        let was_on = self.io.output_level();
        self.io.set_output(on);
        if was_on != on {
            self.sink.emit(&AppEvent::OutputChanged { energized: on });
        }
    }

    /// Supervised modes need the interlock (or bypass) and a live heartbeat.
    /// Every other mode may always energize.
    pub fn can_turn_on(&self) -> bool {
        let (mode, bypass, missing_heartbeat) = self
            .model
            .read(|s| (s.class.mode(), s.safety_bypass, s.missing_heartbeat));
        if mode.is_supervised() {
            (self.io.safety_ok() || bypass) && !missing_heartbeat
        } else {
            true
        }
    }

    /// Feedback line at the configured level.
    pub fn feedback_matches(&self) -> bool {
        self.io.signal_level() == self.model.feedback().expected_level()
    }
}
