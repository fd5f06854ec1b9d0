//! Modbus RTU slave: framing, PDU codec, register map and dispatcher.

pub mod dispatcher;
pub mod pdu;
pub mod registers;
pub mod rtu;

pub use dispatcher::{BROADCAST_ADDRESS, DispatchEnv, Dispatcher, Reply};
pub use rtu::{Frame, FrameAccumulator};
