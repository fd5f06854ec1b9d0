//! Relay minion firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host
//! simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod event_log;
pub mod modbus;
pub mod model;
pub mod pins;
pub mod relay;
pub mod timer;

// Hardware-facing layers. Each keeps a simulation path for the host.
pub mod adapters;
pub mod drivers;
