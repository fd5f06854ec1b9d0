//! GPIO / peripheral pin assignments for the relay minion board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Relay output
// ---------------------------------------------------------------------------

/// Digital output: relay coil driver (active HIGH).
pub const RELAY_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// Digital inputs (external pull-ups, opto-isolated)
// ---------------------------------------------------------------------------

/// Safety interlock line. HIGH = interlock asserted.
pub const SAFETY_GPIO: i32 = 5;
/// Activation-feedback line from the load.
pub const SIGNAL_GPIO: i32 = 6;

// ---------------------------------------------------------------------------
// Status LEDs (active LOW)
// ---------------------------------------------------------------------------

/// Green: bus master heartbeat present.
pub const LED_COMM_GPIO: i32 = 8;
/// Red: output energized and healthy.
pub const LED_ACTIVITY_GPIO: i32 = 9;

// ---------------------------------------------------------------------------
// RS-485 transceiver
// ---------------------------------------------------------------------------

/// UART port dedicated to the Modbus bus.
pub const RS485_UART_PORT: i32 = 1;
pub const RS485_TX_GPIO: i32 = 21;
pub const RS485_RX_GPIO: i32 = 20;
/// Driver-enable line, toggled by the UART in RS-485 half-duplex mode.
pub const RS485_DE_GPIO: i32 = 7;
/// UART driver ring buffers (bytes).
pub const RS485_RX_BUFFER: i32 = 512;
pub const RS485_TX_BUFFER: i32 = 512;
