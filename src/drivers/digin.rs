//! Debounced digital inputs.
//!
//! Each line is sampled once per control tick. A new level is accepted only
//! after [`INPUT_DEBOUNCE_SAMPLES`] consecutive identical samples, which
//! filters relay chatter and contact bounce on the opto-isolated inputs.
//!
//! Accepted levels are mirrored into [`SharedInputs`] so the console thread
//! can report them without touching the pins.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::InputPin;
use log::warn;

use crate::config::INPUT_DEBOUNCE_SAMPLES;

pub struct DebouncedInput<P> {
    pin: P,
    stable: bool,
    candidate: bool,
    count: u8,
}

impl<P: InputPin> DebouncedInput<P> {
    /// Seed the stable level from one immediate read.
    pub fn new(mut pin: P) -> Self {
        let level = Self::read(&mut pin).unwrap_or(false);
        Self {
            pin,
            stable: level,
            candidate: level,
            count: 0,
        }
    }

    /// Take one sample. Returns `true` when the accepted level changed.
    pub fn sample(&mut self) -> bool {
        let Some(level) = Self::read(&mut self.pin) else {
            return false;
        };

        if level == self.stable {
            self.count = 0;
            self.candidate = level;
            return false;
        }

        if level != self.candidate {
            self.candidate = level;
            self.count = 0;
        }
        self.count += 1;

        if self.count >= INPUT_DEBOUNCE_SAMPLES {
            self.stable = level;
            self.count = 0;
            return true;
        }
        false
    }

    pub fn level(&self) -> bool {
        self.stable
    }

    fn read(pin: &mut P) -> Option<bool> {
        match pin.is_high() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!("digin: pin read failed: {:?}", e);
                None
            }
        }
    }
}

/// Last accepted input levels, readable from any thread.
#[derive(Debug, Default)]
pub struct SharedInputs {
    safety: AtomicBool,
    signal: AtomicBool,
}

impl SharedInputs {
    pub const fn new() -> Self {
        Self {
            safety: AtomicBool::new(false),
            signal: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, safety: bool, signal: bool) {
        self.safety.store(safety, Ordering::Release);
        self.signal.store(signal, Ordering::Release);
    }

    pub fn safety(&self) -> bool {
        self.safety.load(Ordering::Acquire)
    }

    pub fn signal(&self) -> bool {
        self.signal.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    use embedded_hal::digital::ErrorType;

    #[derive(Clone, Default)]
    struct Line(Rc<Cell<bool>>);

    impl ErrorType for Line {
        type Error = Infallible;
    }

    impl InputPin for Line {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    #[test]
    fn initial_level_is_read_immediately() {
        let line = Line::default();
        line.0.set(true);
        let input = DebouncedInput::new(line);
        assert!(input.level());
    }

    #[test]
    fn change_needs_consecutive_samples() {
        let line = Line::default();
        let mut input = DebouncedInput::new(line.clone());

        line.0.set(true);
        for _ in 1..INPUT_DEBOUNCE_SAMPLES {
            assert!(!input.sample());
        }
        assert!(!input.level());
        assert!(input.sample());
        assert!(input.level());
        assert!(!input.sample());
    }

    #[test]
    fn bounce_restarts_the_count() {
        let line = Line::default();
        let mut input = DebouncedInput::new(line.clone());

        line.0.set(true);
        input.sample();
        input.sample();
        line.0.set(false);
        input.sample();
        line.0.set(true);
        for _ in 1..INPUT_DEBOUNCE_SAMPLES {
            assert!(!input.sample());
        }
        assert!(input.sample());
    }

    #[test]
    fn shared_inputs_publish() {
        let shared = SharedInputs::new();
        shared.publish(true, false);
        assert!(shared.safety());
        assert!(!shared.signal());
    }
}
