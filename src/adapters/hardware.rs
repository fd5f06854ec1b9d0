//! Hardware adapter. Bridges the relay driver and the debounced inputs to
//! the port traits.
//!
//! ```text
//!   RelayStateMachine ──▶ RelayOutputPort ──▶ RelayDriver ──▶ coil
//!   RelayStateMachine ◀── SignalPort      ◀── DebouncedInput ◀── safety / signal
//! ```
//!
//! Generic over `embedded-hal` pins: [`Gpio`](crate::drivers::hw_init::Gpio)
//! on target, mock pins in tests.

use std::sync::Arc;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::app::ports::{RelayOutputPort, SignalPort};
use crate::drivers::digin::{DebouncedInput, SharedInputs};
use crate::drivers::relay::RelayDriver;
use crate::modbus::registers::{INPUT_SAFETY, INPUT_SIGNAL};

pub struct HardwareAdapter<R, S, F> {
    relay: RelayDriver<R>,
    safety: DebouncedInput<S>,
    signal: DebouncedInput<F>,
    shared: Arc<SharedInputs>,
}

impl<R: OutputPin, S: InputPin, F: InputPin> HardwareAdapter<R, S, F> {
    pub fn new(relay: R, safety: S, signal: F, shared: Arc<SharedInputs>) -> Self {
        let adapter = Self {
            relay: RelayDriver::new(relay),
            safety: DebouncedInput::new(safety),
            signal: DebouncedInput::new(signal),
            shared,
        };
        adapter.publish();
        adapter
    }

    /// Input levels mirrored for other threads.
    pub fn shared_inputs(&self) -> Arc<SharedInputs> {
        Arc::clone(&self.shared)
    }

    fn publish(&self) {
        self.shared.publish(self.safety.level(), self.signal.level());
    }
}

impl<R: OutputPin, S: InputPin, F: InputPin> SignalPort for HardwareAdapter<R, S, F> {
    fn poll(&mut self) -> bool {
        // Sample both lines every tick even if the first changed.
        let safety_changed = self.safety.sample();
        let signal_changed = self.signal.sample();
        let changed = safety_changed || signal_changed;
        if changed {
            self.publish();
        }
        changed
    }

    fn safety_ok(&self) -> bool {
        self.safety.level()
    }

    fn signal_level(&self) -> bool {
        self.signal.level()
    }

    fn input(&self, index: u16) -> Option<bool> {
        match index {
            INPUT_SAFETY => Some(self.safety.level()),
            INPUT_SIGNAL => Some(self.signal.level()),
            _ => None,
        }
    }
}

impl<R: OutputPin, S: InputPin, F: InputPin> RelayOutputPort for HardwareAdapter<R, S, F> {
    fn set_output(&mut self, energized: bool) {
        self.relay.set(energized);
    }

    fn output_level(&self) -> bool {
        self.relay.is_energized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    use embedded_hal::digital::ErrorType;

    use crate::config::INPUT_DEBOUNCE_SAMPLES;

    #[derive(Clone, Default)]
    struct Pin(Rc<Cell<bool>>);

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl InputPin for Pin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    fn adapter() -> (HardwareAdapter<Pin, Pin, Pin>, Pin, Pin, Pin) {
        let (coil, safety, signal) = (Pin::default(), Pin::default(), Pin::default());
        safety.0.set(true);
        let hw = HardwareAdapter::new(
            coil.clone(),
            safety.clone(),
            signal.clone(),
            Arc::new(SharedInputs::new()),
        );
        (hw, coil, safety, signal)
    }

    #[test]
    fn output_drives_coil() {
        let (mut hw, coil, _, _) = adapter();
        assert!(!hw.output_level());
        hw.set_output(true);
        assert!(coil.0.get());
        assert!(hw.output_level());
    }

    #[test]
    fn discrete_input_map() {
        let (hw, _, _, _) = adapter();
        assert_eq!(hw.input(INPUT_SAFETY), Some(true));
        assert_eq!(hw.input(INPUT_SIGNAL), Some(false));
        assert_eq!(hw.input(2), None);
        assert!(hw.shared_inputs().safety());
    }

    #[test]
    fn poll_reports_debounced_changes_and_publishes() {
        let (mut hw, _, safety, _) = adapter();
        safety.0.set(false);
        let changes = (0..INPUT_DEBOUNCE_SAMPLES).filter(|_| hw.poll()).count();
        assert_eq!(changes, 1);
        assert!(!hw.safety_ok());
        assert!(!hw.shared_inputs().safety());
    }
}
