//! Relay coil driver.
//!
//! Generic over an `embedded-hal` output pin. On ESP-IDF the pin is a
//! [`Gpio`](super::hw_init::Gpio); tests drive a mock pin.
//!
//! The driver remembers the level it last drove. A pin error leaves that
//! record untouched so the reported output never claims a level the coil
//! did not receive.

use embedded_hal::digital::OutputPin;
use log::warn;

pub struct RelayDriver<P> {
    pin: P,
    energized: bool,
}

impl<P: OutputPin> RelayDriver<P> {
    /// Take ownership of `pin` and force the coil off.
    pub fn new(mut pin: P) -> Self {
        if pin.set_low().is_err() {
            warn!("Relay: failed to de-energize coil at init");
        }
        Self {
            pin,
            energized: false,
        }
    }

    pub fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.energized = on,
            Err(e) => warn!("Relay: pin write failed: {:?}", e),
        }
    }

    pub fn is_energized(&self) -> bool {
        self.energized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Default)]
    struct Pin {
        high: bool,
        writes: usize,
    }

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn starts_de_energized() {
        let relay = RelayDriver::new(Pin {
            high: true,
            writes: 0,
        });
        assert!(!relay.is_energized());
        assert!(!relay.pin.high);
        assert_eq!(relay.pin.writes, 1);
    }

    #[test]
    fn follows_commands() {
        let mut relay = RelayDriver::new(Pin::default());
        relay.set(true);
        assert!(relay.is_energized());
        assert!(relay.pin.high);
        relay.set(false);
        assert!(!relay.is_energized());
        assert!(!relay.pin.high);
    }
}
