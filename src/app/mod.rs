//! Application core: pure domain logic, zero direct I/O.
//!
//! The control loop, console, persistence layer and the events they
//! exchange. All interaction with hardware happens through the port traits
//! defined in [`ports`], keeping this layer testable without peripherals.

pub mod commands;
pub mod configuration;
pub mod console;
pub mod controller;
pub mod events;
pub mod ports;
