//! RS-485 bus adapter.
//!
//! On ESP-IDF: non-blocking reads and writes on the UART configured by
//! [`hw_init`](crate::drivers::hw_init) in RS-485 half-duplex mode, where
//! the peripheral toggles the transceiver's driver-enable line itself.
//!
//! On host/test: an in-memory line. Bytes injected with
//! [`Rs485Adapter::inject`] are returned by `read`; written frames are kept
//! for inspection.

use crate::app::ports::{BusError, BusPort};

#[cfg(target_os = "espidf")]
use crate::pins;

pub struct Rs485Adapter {
    #[cfg(target_os = "espidf")]
    port: i32,
    #[cfg(not(target_os = "espidf"))]
    rx: std::collections::VecDeque<u8>,
    #[cfg(not(target_os = "espidf"))]
    sent: Vec<Vec<u8>>,
}

impl Default for Rs485Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Rs485Adapter {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            port: pins::RS485_UART_PORT,
            #[cfg(not(target_os = "espidf"))]
            rx: std::collections::VecDeque::new(),
            #[cfg(not(target_os = "espidf"))]
            sent: Vec::new(),
        }
    }

    /// Queue bytes as if they arrived from the bus.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Drain the frames written so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sent)
    }
}

#[cfg(target_os = "espidf")]
impl BusPort for Rs485Adapter {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        // SAFETY: the UART driver was installed by hw_init; `buf` is valid
        // for `buf.len()` bytes and a zero tick timeout never blocks.
        let n = unsafe {
            esp_idf_svc::sys::uart_read_bytes(self.port, buf.as_mut_ptr().cast(), buf.len() as u32, 0)
        };
        usize::try_from(n).unwrap_or(0)
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), BusError> {
        // SAFETY: `frame` is valid for its length; the driver copies it
        // into the TX ring buffer before returning.
        let n = unsafe {
            esp_idf_svc::sys::uart_write_bytes(self.port, frame.as_ptr().cast(), frame.len())
        };
        if n < 0 {
            return Err(BusError::WriteFailed(n));
        }
        if n as usize != frame.len() {
            return Err(BusError::Overflow);
        }
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl BusPort for Rs485Adapter {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), BusError> {
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_in_chunks() {
        let mut bus = Rs485Adapter::new();
        bus.inject(&[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(bus.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(bus.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(bus.read(&mut buf), 0);
    }

    #[test]
    fn records_written_frames() {
        let mut bus = Rs485Adapter::new();
        bus.write(&[0xAA]).unwrap();
        bus.write(&[0xBB, 0xCC]).unwrap();
        assert_eq!(bus.take_sent(), vec![vec![0xAA], vec![0xBB, 0xCC]]);
        assert!(bus.take_sent().is_empty());
    }
}
