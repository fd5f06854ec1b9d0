//! Persistent event log.
//!
//! Keeps the most recent [`EVENT_LOG_CAPACITY`] entries in RAM and mirrors
//! them into an NVS ring under the "events" namespace: one postcard-encoded
//! entry per slot key (`e0`..`e31`) plus a write index. On boot the ring is
//! replayed oldest-first so the register view survives a power cycle.
//!
//! The bus master reads the log through holding registers; each entry is
//! rendered as a fixed 8-byte big-endian record:
//!
//! ```text
//!   ┌───────────────┬─────────┬─────────┐
//!   │ uptime_secs   │ code    │ value   │
//!   │ u32 BE        │ u16 BE  │ u16 BE  │
//!   └───────────────┴─────────┴─────────┘
//! ```

use heapless::Deque;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::ports::{EventLogPort, StoragePort};
use crate::config::EVENT_LOG_CAPACITY;

pub const EVENT_ENTRY_SIZE: usize = 8;

const EVENT_NAMESPACE: &str = "events";
const EVENT_INDEX_KEY: &str = "e_idx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventCode {
    PowerOn = 1,
    OutputOn = 2,
    OutputOff = 3,
    InterlockOpen = 4,
    FeedbackExhausted = 5,
    HeartbeatLost = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub uptime_secs: u32,
    pub code: u16,
    pub value: u16,
}

impl EventEntry {
    pub fn new(uptime_secs: u32, code: EventCode, value: u16) -> Self {
        Self {
            uptime_secs,
            code: code as u16,
            value,
        }
    }

    pub fn to_bytes(&self) -> [u8; EVENT_ENTRY_SIZE] {
        let mut out = [0u8; EVENT_ENTRY_SIZE];
        out[..4].copy_from_slice(&self.uptime_secs.to_be_bytes());
        out[4..6].copy_from_slice(&self.code.to_be_bytes());
        out[6..].copy_from_slice(&self.value.to_be_bytes());
        out
    }
}

/// NVS-backed ring of [`EventEntry`].
pub struct EventLog<S: StoragePort> {
    storage: S,
    entries: Deque<EventEntry, EVENT_LOG_CAPACITY>,
    write_index: usize,
}

impl<S: StoragePort> EventLog<S> {
    /// Restore the ring from `storage`.
    pub fn load(storage: S) -> Self {
        let mut log = Self {
            storage,
            entries: Deque::new(),
            write_index: 0,
        };

        let mut buf = [0u8; 4];
        if let Ok(4) = log.storage.read(EVENT_NAMESPACE, EVENT_INDEX_KEY, &mut buf) {
            log.write_index = u32::from_le_bytes(buf) as usize % EVENT_LOG_CAPACITY;
        }

        // Oldest slot is the one about to be overwritten, if it exists.
        for i in 0..EVENT_LOG_CAPACITY {
            let slot = (log.write_index + i) % EVENT_LOG_CAPACITY;
            let mut raw = [0u8; 16];
            let Ok(len) = log.storage.read(EVENT_NAMESPACE, &Self::slot_key(slot), &mut raw) else {
                continue;
            };
            match postcard::from_bytes::<EventEntry>(&raw[..len]) {
                Ok(entry) => {
                    let _ = log.entries.push_back(entry);
                }
                Err(_) => warn!("EventLog: slot {} corrupted, skipped", slot),
            }
        }

        log
    }

    /// Append an entry, evicting the oldest when full.
    pub fn record(&mut self, entry: EventEntry) {
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        let _ = self.entries.push_back(entry);

        let slot_key = Self::slot_key(self.write_index);
        match postcard::to_allocvec(&entry) {
            Ok(bytes) => {
                if let Err(e) = self.storage.write(EVENT_NAMESPACE, &slot_key, &bytes) {
                    warn!("EventLog: failed to persist entry: {}", e);
                }
            }
            Err(_) => warn!("EventLog: failed to encode entry"),
        }

        self.write_index = (self.write_index + 1) % EVENT_LOG_CAPACITY;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = self
            .storage
            .write(EVENT_NAMESPACE, EVENT_INDEX_KEY, &idx_bytes);
    }

    /// Entry by position, oldest first.
    pub fn get(&self, index: usize) -> Option<&EventEntry> {
        self.entries.iter().nth(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Erase every slot and the write index.
    pub fn clear(&mut self) {
        for i in 0..EVENT_LOG_CAPACITY {
            let _ = self.storage.delete(EVENT_NAMESPACE, &Self::slot_key(i));
        }
        let _ = self.storage.delete(EVENT_NAMESPACE, EVENT_INDEX_KEY);
        self.entries.clear();
        self.write_index = 0;
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("e{}", index));
        s
    }
}

impl<S: StoragePort> EventLogPort for EventLog<S> {
    fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    fn serialize(&self, index: usize) -> Option<[u8; EVENT_ENTRY_SIZE]> {
        self.get(index).map(EventEntry::to_bytes)
    }
}
