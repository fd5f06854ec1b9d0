//! Relay, input and LED drivers, hardware initialisation and the watchdog.

pub mod digin;
pub mod hw_init;
pub mod led_patterns;
pub mod relay;
pub mod status_led;
pub mod watchdog;
