//! Time-based rendering of [`LedPattern`]s for single-colour LEDs.
//!
//! Each LED owns a [`PatternPlayer`]. The phase restarts whenever the
//! requested pattern changes, so a fault indication always begins with the
//! same visible edge.
//!
//! | Pattern     | Cycle   | Lit                  |
//! |-------------|---------|----------------------|
//! | Solid       | —       | always               |
//! | SlowBlink   | 1000 ms | first 500 ms         |
//! | FastBlink   | 250 ms  | first 125 ms         |
//! | DoubleBlink | 1000 ms | 0..100, 200..300 ms  |

use crate::app::ports::LedPattern;

/// Phase tracker for one LED.
#[derive(Debug, Default)]
pub struct PatternPlayer {
    pattern: LedPattern,
    since_ms: u64,
}

impl PatternPlayer {
    pub const fn new() -> Self {
        Self {
            pattern: LedPattern::Off,
            since_ms: 0,
        }
    }

    pub fn pattern(&self) -> LedPattern {
        self.pattern
    }

    /// Level the LED should show at `now_ms` for `pattern`.
    pub fn level(&mut self, pattern: LedPattern, now_ms: u64) -> bool {
        if pattern != self.pattern {
            self.pattern = pattern;
            self.since_ms = now_ms;
        }
        lit(pattern, now_ms.saturating_sub(self.since_ms))
    }
}

/// Whether `pattern` is lit `phase_ms` after it started.
pub fn lit(pattern: LedPattern, phase_ms: u64) -> bool {
    match pattern {
        LedPattern::Off => false,
        LedPattern::Solid => true,
        LedPattern::SlowBlink => phase_ms % 1000 < 500,
        LedPattern::FastBlink => phase_ms % 250 < 125,
        LedPattern::DoubleBlink => {
            let cycle = phase_ms % 1000;
            cycle < 100 || (200..300).contains(&cycle)
        }
    }
}
