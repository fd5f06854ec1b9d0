//! Communication and activity LEDs.
//!
//! Both LEDs are wired active low. Each renders its requested
//! [`LedPattern`] through a [`PatternPlayer`]; pins are only written when
//! the level changes.

use embedded_hal::digital::OutputPin;
use log::warn;

use super::led_patterns::PatternPlayer;
use crate::app::ports::{IndicatorPort, LedPattern};

pub struct StatusLeds<C, A> {
    communication: C,
    activity: A,
    players: (PatternPlayer, PatternPlayer),
    state: (bool, bool),
}

impl<C: OutputPin, A: OutputPin> StatusLeds<C, A> {
    pub fn new(communication: C, activity: A) -> Self {
        let mut leds = Self {
            communication,
            activity,
            players: (PatternPlayer::new(), PatternPlayer::new()),
            state: (false, false),
        };
        drive(&mut leds.communication, false);
        drive(&mut leds.activity, false);
        leds
    }

    /// `(communication, activity)` as last driven.
    pub fn state(&self) -> (bool, bool) {
        self.state
    }
}

fn drive(pin: &mut impl OutputPin, lit: bool) {
    let result = if lit { pin.set_low() } else { pin.set_high() };
    if let Err(e) = result {
        warn!("StatusLed: pin write failed: {:?}", e);
    }
}

impl<C: OutputPin, A: OutputPin> IndicatorPort for StatusLeds<C, A> {
    fn set_communication(&mut self, pattern: LedPattern, now_ms: u64) {
        let on = self.players.0.level(pattern, now_ms);
        if self.state.0 != on {
            drive(&mut self.communication, on);
            self.state.0 = on;
        }
    }

    fn set_activity(&mut self, pattern: LedPattern, now_ms: u64) {
        let on = self.players.1.level(pattern, now_ms);
        if self.state.1 != on {
            drive(&mut self.activity, on);
            self.state.1 = on;
        }
    }
}
