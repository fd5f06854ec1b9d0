//! Event sink adapters.
//!
//! [`LogEventSink`] writes every [`AppEvent`] to the ESP-IDF logger (UART /
//! USB-CDC in production). [`JournalSink`] does the same and additionally
//! appends the events the bus master cares about to the persistent
//! [`EventLog`], which makes it the [`Journal`](crate::app::ports::Journal)
//! handed to the controller.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{ClockPort, EventLogPort, EventSink, StoragePort};
use crate::error::SafetyFault;
use crate::event_log::{EVENT_ENTRY_SIZE, EventCode, EventEntry, EventLog};

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started => info!("START | relay minion up"),
            AppEvent::StateChanged { from, to } => info!("STATE | {:?} -> {:?}", from, to),
            AppEvent::OutputChanged { energized } => {
                info!("RELAY | {}", if *energized { "energized" } else { "released" });
            }
            AppEvent::FeedbackRetry { attempt } => {
                warn!("FEEDBACK | mismatch, retry {}", attempt);
            }
            AppEvent::SafetyFault(fault) => warn!("FAULT | {}", fault),
            AppEvent::HeartbeatRestored => info!("HEARTBEAT | restored"),
            AppEvent::AddressChanged(address) => info!("CONFIG | address -> {}", address),
            AppEvent::WorkTimeSaved(secs) => info!("WORK | saved {} s", secs),
        }
    }
}

/// Logging sink backed by the persistent event log.
pub struct JournalSink<S: StoragePort, C: ClockPort> {
    log: EventLog<S>,
    clock: C,
    console: LogEventSink,
}

impl<S: StoragePort, C: ClockPort> JournalSink<S, C> {
    pub fn new(log: EventLog<S>, clock: C) -> Self {
        Self {
            log,
            clock,
            console: LogEventSink::new(),
        }
    }

    pub fn event_log(&self) -> &EventLog<S> {
        &self.log
    }

    /// Event-log code for `event`, if it is one worth persisting.
    fn code(event: &AppEvent) -> Option<EventCode> {
        match event {
            AppEvent::Started => Some(EventCode::PowerOn),
            AppEvent::OutputChanged { energized: true } => Some(EventCode::OutputOn),
            AppEvent::OutputChanged { energized: false } => Some(EventCode::OutputOff),
            AppEvent::SafetyFault(SafetyFault::InterlockOpen) => Some(EventCode::InterlockOpen),
            AppEvent::SafetyFault(SafetyFault::FeedbackExhausted) => {
                Some(EventCode::FeedbackExhausted)
            }
            AppEvent::SafetyFault(SafetyFault::HeartbeatLost) => Some(EventCode::HeartbeatLost),
            _ => None,
        }
    }
}

impl<S: StoragePort, C: ClockPort> EventSink for JournalSink<S, C> {
    fn emit(&mut self, event: &AppEvent) {
        self.console.emit(event);
        if let Some(code) = Self::code(event) {
            let uptime_secs = u32::try_from(self.clock.now_ms() / 1000).unwrap_or(u32::MAX);
            self.log.record(EventEntry::new(uptime_secs, code, 0));
        }
    }
}

impl<S: StoragePort, C: ClockPort> EventLogPort for JournalSink<S, C> {
    fn count(&self) -> u16 {
        self.log.count()
    }

    fn serialize(&self, index: usize) -> Option<[u8; EVENT_ENTRY_SIZE]> {
        self.log.serialize(index)
    }
}
