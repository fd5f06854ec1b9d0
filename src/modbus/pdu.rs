//! Modbus PDU decoding and response building.
//!
//! Decoding validates the shape of a request (lengths, byte counts,
//! quantity limits) and nothing else: whether an index exists or a value
//! is acceptable is the dispatcher's business.

use crate::error::{ModbusException, ProtocolError};

/// Largest PDU that fits an RTU frame.
pub const MAX_PDU_SIZE: usize = 253;

pub type Pdu = heapless::Vec<u8, MAX_PDU_SIZE>;

pub mod function {
    pub const READ_COILS: u8 = 0x01;
    pub const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const READ_INPUT_REGISTERS: u8 = 0x04;
    pub const WRITE_SINGLE_COIL: u8 = 0x05;
    pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
    pub const MASK_WRITE_REGISTER: u8 = 0x16;

    pub const CONFIG_ADDRESS: u8 = 64;
    pub const RANDOM_SERIAL_NUMBER: u8 = 65;
    pub const NETWORK_INITIALIZATION: u8 = 66;
    pub const SET_CLASS_OUTPUT: u8 = 67;
    pub const SET_TIME: u8 = 68;
    pub const HEARTBEAT: u8 = 69;

    pub const fn is_custom(code: u8) -> bool {
        matches!(code, CONFIG_ADDRESS..=HEARTBEAT)
    }
}

pub const MAX_READ_BITS: u16 = 2000;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_COILS: u16 = 1968;
pub const MAX_WRITE_REGISTERS: u16 = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

/// Which table a read request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Coils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Read {
        table: Table,
        start: u16,
        count: u16,
    },
    WriteSingleCoil {
        index: u16,
        value: bool,
    },
    WriteSingleRegister {
        index: u16,
        value: u16,
    },
    /// Coil states packed LSB first.
    WriteMultipleCoils {
        start: u16,
        count: u16,
        packed: &'a [u8],
    },
    /// Big-endian register values.
    WriteMultipleRegisters {
        start: u16,
        count: u16,
        data: &'a [u8],
    },
    MaskWriteRegister {
        index: u16,
        and_mask: u16,
        or_mask: u16,
    },
    /// Vendor function; `payload` excludes the function code.
    Custom {
        function: u8,
        payload: &'a [u8],
    },
}

/// Why a PDU could not become a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduError {
    /// Malformed; dropped without a reply.
    Protocol(ProtocolError),
    /// Well-formed but refused; answered with an exception.
    Exception {
        function: u8,
        exception: ModbusException,
    },
}

impl From<ProtocolError> for PduError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

fn word(pdu: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([pdu[at], pdu[at + 1]])
}

fn expect_len(pdu: &[u8], function: u8, len: usize) -> Result<(), PduError> {
    if pdu.len() < len {
        return Err(ProtocolError::Truncated { function }.into());
    }
    Ok(())
}

fn check_quantity(function: u8, start: u16, count: u16, max: u16) -> Result<(), PduError> {
    if count == 0 || count > max {
        return Err(PduError::Exception {
            function,
            exception: ModbusException::IllegalDataValue,
        });
    }
    if u32::from(start) + u32::from(count) > 0x1_0000 {
        return Err(PduError::Exception {
            function,
            exception: ModbusException::IllegalDataAddress,
        });
    }
    Ok(())
}

pub fn decode(pdu: &[u8]) -> Result<Request<'_>, PduError> {
    let Some(&function) = pdu.first() else {
        return Err(ProtocolError::FrameTooShort(0).into());
    };

    match function {
        function::READ_COILS
        | function::READ_DISCRETE_INPUTS
        | function::READ_HOLDING_REGISTERS
        | function::READ_INPUT_REGISTERS => {
            expect_len(pdu, function, 5)?;
            let (start, count) = (word(pdu, 1), word(pdu, 3));
            let (table, max) = match function {
                function::READ_COILS => (Table::Coils, MAX_READ_BITS),
                function::READ_DISCRETE_INPUTS => (Table::DiscreteInputs, MAX_READ_BITS),
                function::READ_HOLDING_REGISTERS => (Table::HoldingRegisters, MAX_READ_REGISTERS),
                _ => (Table::InputRegisters, MAX_READ_REGISTERS),
            };
            check_quantity(function, start, count, max)?;
            Ok(Request::Read {
                table,
                start,
                count,
            })
        }

        function::WRITE_SINGLE_COIL => {
            expect_len(pdu, function, 5)?;
            let value = match word(pdu, 3) {
                COIL_ON => true,
                COIL_OFF => false,
                _ => {
                    return Err(PduError::Exception {
                        function,
                        exception: ModbusException::IllegalDataValue,
                    });
                }
            };
            Ok(Request::WriteSingleCoil {
                index: word(pdu, 1),
                value,
            })
        }

        function::WRITE_SINGLE_REGISTER => {
            expect_len(pdu, function, 5)?;
            Ok(Request::WriteSingleRegister {
                index: word(pdu, 1),
                value: word(pdu, 3),
            })
        }

        function::WRITE_MULTIPLE_COILS => {
            expect_len(pdu, function, 6)?;
            let (start, count) = (word(pdu, 1), word(pdu, 3));
            check_quantity(function, start, count, MAX_WRITE_COILS)?;
            let byte_count = usize::from(pdu[5]);
            if byte_count != usize::from(count).div_ceil(8) || pdu.len() != 6 + byte_count {
                return Err(ProtocolError::ByteCountMismatch { function }.into());
            }
            Ok(Request::WriteMultipleCoils {
                start,
                count,
                packed: &pdu[6..],
            })
        }

        function::WRITE_MULTIPLE_REGISTERS => {
            expect_len(pdu, function, 6)?;
            let (start, count) = (word(pdu, 1), word(pdu, 3));
            check_quantity(function, start, count, MAX_WRITE_REGISTERS)?;
            let byte_count = usize::from(pdu[5]);
            if byte_count != usize::from(count) * 2 || pdu.len() != 6 + byte_count {
                return Err(ProtocolError::ByteCountMismatch { function }.into());
            }
            Ok(Request::WriteMultipleRegisters {
                start,
                count,
                data: &pdu[6..],
            })
        }

        function::MASK_WRITE_REGISTER => {
            expect_len(pdu, function, 7)?;
            Ok(Request::MaskWriteRegister {
                index: word(pdu, 1),
                and_mask: word(pdu, 3),
                or_mask: word(pdu, 5),
            })
        }

        f if function::is_custom(f) => Ok(Request::Custom {
            function: f,
            payload: &pdu[1..],
        }),

        _ => Err(PduError::Exception {
            function,
            exception: ModbusException::IllegalFunction,
        }),
    }
}

// ───────────────────────────────────────────────────────────────
// Responses
// ───────────────────────────────────────────────────────────────

pub fn exception(function: u8, exception: ModbusException) -> Pdu {
    let mut pdu = Pdu::new();
    let _ = pdu.push(function | 0x80);
    let _ = pdu.push(exception.code());
    pdu
}

/// `[fc, byte_count, bits packed LSB first..]`
pub fn bits(function: u8, values: impl IntoIterator<Item = bool>) -> Pdu {
    let mut pdu = Pdu::new();
    let _ = pdu.push(function);
    let _ = pdu.push(0);
    for (i, on) in values.into_iter().enumerate() {
        if i % 8 == 0 {
            let _ = pdu.push(0);
        }
        if on {
            if let Some(last) = pdu.last_mut() {
                *last |= 1 << (i % 8);
            }
        }
    }
    pdu[1] = (pdu.len() - 2) as u8;
    pdu
}

/// `[fc, byte_count, registers BE..]`
pub fn registers(function: u8, values: impl IntoIterator<Item = u16>) -> Pdu {
    let mut pdu = Pdu::new();
    let _ = pdu.push(function);
    let _ = pdu.push(0);
    for v in values {
        let _ = pdu.extend_from_slice(&v.to_be_bytes());
    }
    pdu[1] = (pdu.len() - 2) as u8;
    pdu
}

/// Echo of a single write or mask write request.
pub fn echo(request: &[u8]) -> Pdu {
    let mut pdu = Pdu::new();
    let _ = pdu.extend_from_slice(&request[..request.len().min(MAX_PDU_SIZE)]);
    pdu
}

/// `[fc, start, count]` acknowledgement of a multiple write.
pub fn write_ack(function: u8, start: u16, count: u16) -> Pdu {
    let mut pdu = Pdu::new();
    let _ = pdu.push(function);
    let _ = pdu.extend_from_slice(&start.to_be_bytes());
    let _ = pdu.extend_from_slice(&count.to_be_bytes());
    pdu
}

/// Coil `i` of a packed multiple-coil payload.
pub fn packed_bit(packed: &[u8], i: usize) -> bool {
    packed.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0)
}
