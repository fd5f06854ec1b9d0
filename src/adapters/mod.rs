//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements              | Connects to                  |
//! |------------|-------------------------|------------------------------|
//! | `hardware` | SignalPort              | debounced safety/signal GPIO |
//! |            | RelayOutputPort         | relay coil GPIO              |
//! | `log_sink` | EventSink               | serial log output            |
//! |            | EventLogPort            | NVS event log                |
//! | `nvs`      | StoragePort             | NVS / in-memory store        |
//! | `rs485`    | BusPort                 | UART in RS-485 half duplex   |
//! | `time`     | ClockPort, RtcPort      | ESP32 system timer and clock |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod rs485;
pub mod time;
