//! Modbus RTU framing.
//!
//! ```text
//!   ┌─────────┬──────────┬──────────────┬────────┬────────┐
//!   │ address │ function │ data (0..252)│ crc lo │ crc hi │
//!   └─────────┴──────────┴──────────────┴────────┴────────┘
//! ```
//!
//! Frames are delimited by bus silence, not by a length field, so the
//! [`FrameAccumulator`] collects UART bytes and releases a frame once the
//! line has been idle for 3.5 character times.

use crc::{CRC_16_MODBUS, Crc};
use log::debug;

use crate::error::ProtocolError;

pub const MAX_ADU_SIZE: usize = 256;
/// Address + function + CRC.
pub const MIN_ADU_SIZE: usize = 4;

pub type Frame = heapless::Vec<u8, MAX_ADU_SIZE>;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// A CRC-checked frame split into address and PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adu<'a> {
    pub address: u8,
    pub pdu: &'a [u8],
}

pub fn decode(frame: &[u8]) -> Result<Adu<'_>, ProtocolError> {
    if frame.len() < MIN_ADU_SIZE {
        return Err(ProtocolError::FrameTooShort(frame.len()));
    }
    if frame.len() > MAX_ADU_SIZE {
        return Err(ProtocolError::FrameTooLong(frame.len()));
    }

    let (body, crc) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([crc[0], crc[1]]);
    let expected = checksum(body);
    if received != expected {
        return Err(ProtocolError::CrcMismatch { expected, received });
    }

    Ok(Adu {
        address: body[0],
        pdu: &body[1..],
    })
}

/// Frame `pdu` for `address`, appending the CRC little-endian.
pub fn encode(address: u8, pdu: &[u8]) -> Result<Frame, ProtocolError> {
    let total = pdu.len() + 3;
    if total > MAX_ADU_SIZE {
        return Err(ProtocolError::FrameTooLong(total));
    }

    let mut frame = Frame::new();
    let _ = frame.push(address);
    let _ = frame.extend_from_slice(pdu);
    let crc = checksum(&frame);
    let _ = frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Inter-frame silence for `baud_rate`, rounded up, never below 2 ms.
///
/// One character is 11 bits on the wire (start, 8 data, parity or second
/// stop, stop), so 3.5 characters are 38.5 bit times.
pub fn silence_ms(baud_rate: u32) -> u64 {
    let baud = u64::from(baud_rate.max(1));
    (385 * 1000_u64).div_ceil(10 * baud).max(2)
}

/// Collects bus bytes into frames separated by line silence.
pub struct FrameAccumulator {
    buf: Frame,
    last_byte_ms: u64,
    silence_ms: u64,
    overflow: bool,
}

impl FrameAccumulator {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            buf: Frame::new(),
            last_byte_ms: 0,
            silence_ms: silence_ms(baud_rate),
            overflow: false,
        }
    }

    pub fn silence(&self) -> u64 {
        self.silence_ms
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn feed(&mut self, bytes: &[u8], now_ms: u64) {
        if bytes.is_empty() {
            return;
        }
        if self.buf.extend_from_slice(bytes).is_err() {
            self.overflow = true;
        }
        self.last_byte_ms = now_ms;
    }

    /// Release the buffered frame once the line has gone quiet.
    /// Oversized bursts are discarded whole.
    pub fn poll(&mut self, now_ms: u64) -> Option<Frame> {
        if self.buf.is_empty() && !self.overflow {
            return None;
        }
        if now_ms.saturating_sub(self.last_byte_ms) < self.silence_ms {
            return None;
        }

        let frame = core::mem::take(&mut self.buf);
        if core::mem::take(&mut self.overflow) {
            debug!("RTU: discarding oversized burst");
            return None;
        }
        Some(frame)
    }
}
