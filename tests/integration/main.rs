//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives a complete controller
//! through the simulated RS-485 bus or the console. All tests run on the
//! host (x86_64) with no real hardware required.

mod bus_tests;
mod console_tests;
mod mock_hw;
mod relay_flow_tests;
