//! Cooperative timer slots.
//!
//! A [`TimerSlot`] holds at most one `(deadline, payload)` pair. Nothing
//! fires on its own: the control loop polls each slot once per tick and a
//! slot whose deadline has passed hands its payload back exactly once.
//! Firing is only as precise as the poll period.
//!
//! ```text
//!   arm(now, delay, payload)          poll(now ≥ deadline)
//!   ──────────────────────▶ [armed] ──────────────────────▶ Some(payload)
//!              ▲              │                               (slot empty)
//!              └── re-arm ────┘ replaces the pending payload
//! ```

/// A single re-armable one-shot timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSlot<T> {
    armed: Option<(u64, T)>,
}

impl<T> Default for TimerSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerSlot<T> {
    pub const fn new() -> Self {
        Self { armed: None }
    }

    /// Arm (or re-arm) the slot to fire `delay_ms` after `now_ms`.
    pub fn arm(&mut self, now_ms: u64, delay_ms: u64, payload: T) {
        self.armed = Some((now_ms.saturating_add(delay_ms), payload));
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.armed.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Take the payload if the deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> Option<T> {
        match self.armed {
            Some((deadline, _)) if now_ms >= deadline => self.armed.take().map(|(_, p)| p),
            _ => None,
        }
    }
}

/// True once `period_ms` has elapsed since `start_ms`.
pub fn is_expired(start_ms: u64, now_ms: u64, period_ms: u64) -> bool {
    now_ms.saturating_sub(start_ms) >= period_ms
}
