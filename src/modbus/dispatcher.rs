//! Register dispatcher.
//!
//! The only path through which the bus master observes or changes the
//! device. A frame is checked, filtered by address, decoded, executed
//! against the device model and the relay state machine, and answered.
//!
//! ```text
//!   frame ─▶ rtu::decode ─▶ address filter ─▶ pdu::decode ─▶ execute
//!                │                │                │            │
//!              drop             drop       drop / exception   Reply
//! ```
//!
//! Broadcast frames (address 0) are executed but never answered, except
//! for the delayed RANDOM_SERIAL_NUMBER reply used during bus bring-up.

use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::app::commands::RelayCommand;
use crate::app::configuration;
use crate::app::events::AppEvent;
use crate::app::ports::{Journal, RelayIo, RtcPort, StoragePort};
use crate::config::{HEARTBEAT_TIMEOUT_MS, RANDOM_REPLY_WINDOW_MS};
use crate::error::{ModbusException, SafetyFault, ValidationError};
use crate::model::DeviceModel;
use crate::model::class::DeviceClass;
use crate::relay::RelayStateMachine;
use crate::relay::context::RelayEnv;
use crate::timer::is_expired;

use super::pdu::{self, Pdu, PduError, Request, Table, function};
use super::registers::{
    ALARM_ATTEMPTS_EXCEEDED, ALARM_SAFETY, COIL_RELAY, COIL_SAFETY_BYPASS, HoldingRegister,
    firmware_version, packed_word,
};
use super::rtu::{self, Frame};

pub const BROADCAST_ADDRESS: u8 = 0;

/// What to send back for one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    None,
    Immediate(Frame),
    Delayed { delay_ms: u64, frame: Frame },
}

/// Collaborators borrowed for one dispatch.
pub struct DispatchEnv<'a> {
    pub model: &'a DeviceModel,
    pub relay: &'a mut RelayStateMachine,
    pub io: &'a mut dyn RelayIo,
    pub storage: &'a mut dyn StoragePort,
    pub rtc: &'a mut dyn RtcPort,
    pub journal: &'a mut dyn Journal,
    pub now_ms: u64,
}

impl DispatchEnv<'_> {
    fn command_relay(&mut self, command: RelayCommand) -> Result<(), SafetyFault> {
        let mut env = RelayEnv::new(self.model, &mut *self.io, self.journal.as_sink(), self.now_ms);
        self.relay.command(command, &mut env)
    }

    fn refresh_relay(&mut self) {
        let mut env = RelayEnv::new(self.model, &mut *self.io, self.journal.as_sink(), self.now_ms);
        self.relay.refresh(&mut env);
    }

    fn emit(&mut self, event: AppEvent) {
        self.journal.emit(&event);
    }
}

enum Outcome {
    Respond(Pdu),
    Silent,
    Delayed(u64, Pdu),
}

pub struct Dispatcher {
    last_heartbeat_ms: u64,
    rng: SmallRng,
}

impl Dispatcher {
    /// `seed` drives the random reply delay; use something unique per
    /// device (the serial number) so minions sharing an address spread out.
    pub fn new(seed: u64, now_ms: u64) -> Self {
        Self {
            last_heartbeat_ms: now_ms,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms
    }

    /// Flag a missing heartbeat the first time the timeout expires.
    /// Returns `true` on that transition.
    pub fn check_heartbeat(&self, env: &mut DispatchEnv<'_>) -> bool {
        if !is_expired(self.last_heartbeat_ms, env.now_ms, HEARTBEAT_TIMEOUT_MS)
            || env.model.missing_heartbeat()
        {
            return false;
        }
        warn!(
            "Dispatcher: no heartbeat for {} ms",
            env.now_ms.saturating_sub(self.last_heartbeat_ms)
        );
        env.model.set_missing_heartbeat(true);
        env.emit(AppEvent::SafetyFault(SafetyFault::HeartbeatLost));
        env.refresh_relay();
        true
    }

    pub fn handle_frame(&mut self, frame: &[u8], env: &mut DispatchEnv<'_>) -> Reply {
        let adu = match rtu::decode(frame) {
            Ok(adu) => adu,
            Err(e) => {
                debug!("Dispatcher: dropping frame: {}", e);
                return Reply::None;
            }
        };

        let own_address = env.model.address();
        let broadcast = adu.address == BROADCAST_ADDRESS;
        if !broadcast && u16::from(adu.address) != own_address {
            debug!("Dispatcher: frame for {}, not {}", adu.address, own_address);
            return Reply::None;
        }

        let outcome = match pdu::decode(adu.pdu) {
            Ok(request) => self.execute(request, adu.pdu, env),
            Err(PduError::Protocol(e)) => {
                warn!("Dispatcher: invalid request: {}; frame {:02X?}", e, frame);
                return Reply::None;
            }
            Err(PduError::Exception {
                function,
                exception,
            }) => Err((function, exception)),
        };

        match outcome {
            Ok(Outcome::Silent) => Reply::None,
            Ok(Outcome::Respond(_)) if broadcast => Reply::None,
            Ok(Outcome::Respond(pdu)) => Self::frame(adu.address, &pdu).map_or(Reply::None, Reply::Immediate),
            Ok(Outcome::Delayed(delay_ms, pdu)) => {
                // Reply from whatever address we hold now, even to a broadcast.
                let address = env.model.address() as u8;
                Self::frame(address, &pdu).map_or(Reply::None, |frame| Reply::Delayed { delay_ms, frame })
            }
            Err((function, exception)) => {
                info!("Dispatcher: exception {} (function {})", exception, function);
                if broadcast {
                    Reply::None
                } else {
                    Self::frame(adu.address, &pdu::exception(function, exception))
                        .map_or(Reply::None, Reply::Immediate)
                }
            }
        }
    }

    fn frame(address: u8, pdu: &[u8]) -> Option<Frame> {
        match rtu::encode(address, pdu) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Dispatcher: cannot frame response: {}", e);
                None
            }
        }
    }

    fn execute(
        &mut self,
        request: Request<'_>,
        raw: &[u8],
        env: &mut DispatchEnv<'_>,
    ) -> Result<Outcome, (u8, ModbusException)> {
        let function = raw[0];
        let fail = |e: ModbusException| (function, e);

        match request {
            Request::Read {
                table,
                start,
                count,
            } => Self::read(table, start, count, function, env)
                .map(Outcome::Respond)
                .map_err(fail),

            Request::WriteSingleCoil { index, value } => {
                Self::write_coil(index, value, env).map_err(fail)?;
                Ok(Outcome::Respond(pdu::echo(raw)))
            }

            Request::WriteMultipleCoils {
                start,
                count,
                packed,
            } => {
                let mut result = Ok(());
                for i in 0..count {
                    let value = pdu::packed_bit(packed, usize::from(i));
                    if let Err(e) = Self::write_coil(start + i, value, env) {
                        result = Err(e);
                    }
                }
                result.map_err(fail)?;
                Ok(Outcome::Respond(pdu::write_ack(function, start, count)))
            }

            Request::WriteSingleRegister { index, value } => {
                Self::write_registers(index, &[value], env).map_err(fail)?;
                Ok(Outcome::Respond(pdu::echo(raw)))
            }

            Request::WriteMultipleRegisters { start, count, data } => {
                let values: heapless::Vec<u16, { pdu::MAX_WRITE_REGISTERS as usize }> = data
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Self::write_registers(start, &values, env).map_err(fail)?;
                Ok(Outcome::Respond(pdu::write_ack(function, start, count)))
            }

            Request::MaskWriteRegister {
                index,
                and_mask,
                or_mask,
            } => {
                let current = Self::read_holding(index, env);
                let value = (current & and_mask) | (or_mask & !and_mask);
                Self::write_registers(index, &[value], env).map_err(fail)?;
                Ok(Outcome::Respond(pdu::echo(raw)))
            }

            Request::Custom { function, payload } => self.custom(function, payload, env).map_err(fail),
        }
    }

    // ── Reads ─────────────────────────────────────────────────

    fn read(
        table: Table,
        start: u16,
        count: u16,
        function: u8,
        env: &mut DispatchEnv<'_>,
    ) -> Result<Pdu, ModbusException> {
        match table {
            Table::Coils => {
                // Every coil reports the physical output.
                let level = env.io.output_level();
                Ok(pdu::bits(function, (0..count).map(|_| level)))
            }
            Table::DiscreteInputs => {
                let io = &*env.io;
                Ok(pdu::bits(
                    function,
                    (0..count).map(|offset| io.input(start + offset).unwrap_or(false)),
                ))
            }
            Table::HoldingRegisters => {
                let mut values: heapless::Vec<u16, { pdu::MAX_READ_REGISTERS as usize }> =
                    heapless::Vec::new();
                for offset in 0..count {
                    let _ = values.push(Self::read_holding(start + offset, env));
                }
                Ok(pdu::registers(function, values))
            }
            Table::InputRegisters => Ok(pdu::registers(function, (0..count).map(|_| 0))),
        }
    }

    /// Gaps in the map read as zero.
    fn read_holding(index: u16, env: &DispatchEnv<'_>) -> u16 {
        let model = env.model;
        let Ok(reg) = HoldingRegister::from_index(index) else {
            return 0;
        };
        match reg {
            HoldingRegister::Address => model.address(),
            HoldingRegister::FirmwareVersion => firmware_version(),
            HoldingRegister::Class => model.class_register(),
            HoldingRegister::SerialHigh => (model.serial_number() >> 16) as u16,
            HoldingRegister::SerialLow => (model.serial_number() & 0xFFFF) as u16,
            HoldingRegister::Alarms => {
                let mut alarms = 0;
                if !env.io.safety_ok() {
                    alarms |= ALARM_SAFETY;
                }
                if model.output_attempts_exceeded() {
                    alarms |= ALARM_ATTEMPTS_EXCEEDED;
                }
                alarms
            }
            HoldingRegister::State => u16::from(env.relay.is_on()),
            HoldingRegister::LogCount => env.journal.count(),
            HoldingRegister::Log { entry, word } => env
                .journal
                .serialize(entry)
                .map_or(0, |bytes| packed_word(&bytes, word)),
            HoldingRegister::SafetyMessage(word) => packed_word(model.safety_message().as_bytes(), word),
            HoldingRegister::FeedbackMessage(word) => {
                packed_word(model.feedback_message().as_bytes(), word)
            }
            HoldingRegister::WorkHours => model.work_hours(),
        }
    }

    // ── Writes ────────────────────────────────────────────────

    fn write_coil(index: u16, value: bool, env: &mut DispatchEnv<'_>) -> Result<(), ModbusException> {
        match index {
            COIL_RELAY => env.command_relay(value.into()).map_err(|fault| {
                warn!("Dispatcher: relay command refused: {}", fault);
                ModbusException::from(fault)
            }),
            COIL_SAFETY_BYPASS => {
                env.model.set_safety_bypass(value);
                Ok(())
            }
            _ => {
                debug!("Dispatcher: write to unused coil {} ignored", index);
                Ok(())
            }
        }
    }

    /// Validate every target first so a refused block changes nothing.
    fn write_registers(start: u16, values: &[u16], env: &mut DispatchEnv<'_>) -> Result<(), ModbusException> {
        let mut targets: heapless::Vec<(HoldingRegister, u16), { pdu::MAX_WRITE_REGISTERS as usize }> =
            heapless::Vec::new();

        for (offset, &value) in values.iter().enumerate() {
            let index = start + offset as u16;
            let reg = match HoldingRegister::from_index(index) {
                Ok(reg) if reg.is_writable() => reg,
                _ => return Err(ValidationError::ReadOnly(index).into()),
            };
            match reg {
                HoldingRegister::Address => {
                    crate::config::DeviceConfig::validate_address(value)?;
                }
                HoldingRegister::Class => {
                    DeviceClass::correct(value)?;
                }
                _ => {}
            }
            let _ = targets.push((reg, value));
        }

        for (reg, value) in targets {
            match reg {
                HoldingRegister::Address => {
                    configuration::save_address(env.storage, env.model, value)?;
                    env.emit(AppEvent::AddressChanged(value));
                }
                HoldingRegister::Class => {
                    configuration::save_class(env.storage, env.model, value)?;
                }
                HoldingRegister::SerialHigh => {
                    let serial = env.model.set_serial_high(value);
                    configuration::save_serial_number(env.storage, env.model, serial);
                }
                HoldingRegister::SerialLow => {
                    let serial = env.model.set_serial_low(value);
                    configuration::save_serial_number(env.storage, env.model, serial);
                }
                HoldingRegister::WorkHours => {
                    info!("Dispatcher: work time reset");
                    env.model.reset_work_seconds();
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ── Vendor functions ──────────────────────────────────────

    fn custom(
        &mut self,
        function: u8,
        payload: &[u8],
        env: &mut DispatchEnv<'_>,
    ) -> Result<Outcome, ModbusException> {
        match function {
            function::CONFIG_ADDRESS => {
                require(payload, 5)?;
                let serial = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let address = u16::from(payload[4]);
                if address == 0 {
                    return Err(ValidationError::Address(address).into());
                }
                if serial == env.model.serial_number() {
                    configuration::save_address(env.storage, env.model, address)?;
                    env.emit(AppEvent::AddressChanged(address));
                } else {
                    debug!("Dispatcher: CONFIG_ADDRESS for serial {}, ignored", serial);
                }
                Ok(Outcome::Silent)
            }

            function::RANDOM_SERIAL_NUMBER => {
                let delay_ms = u64::from(self.rng.gen_range(0..RANDOM_REPLY_WINDOW_MS));
                let mut reply = Pdu::new();
                let _ = reply.push(function);
                let _ = reply.extend_from_slice(&env.model.serial_number().to_be_bytes());
                let _ = reply.extend_from_slice(&env.model.class_register().to_be_bytes());
                debug!("Dispatcher: serial number reply in {} ms", delay_ms);
                Ok(Outcome::Delayed(delay_ms, reply))
            }

            function::NETWORK_INITIALIZATION => {
                info!("Dispatcher: network initialization, output off");
                // Off is never refused.
                let _ = env.command_relay(RelayCommand::Off);
                Ok(Outcome::Silent)
            }

            function::SET_CLASS_OUTPUT => {
                require(payload, 4)?;
                let class = u16::from_be_bytes([payload[0], payload[1]]);
                let output = payload[2] != 0;
                env.model.set_safety_bypass(payload[3] != 0);
                if class == env.model.class_register() {
                    if let Err(fault) = env.command_relay(output.into()) {
                        warn!("Dispatcher: class output refused: {}", fault);
                    }
                }
                Ok(Outcome::Silent)
            }

            function::SET_TIME => {
                require(payload, 8)?;
                let mut ts = [0u8; 8];
                ts.copy_from_slice(&payload[..8]);
                let unix_secs = u64::from_be_bytes(ts);
                env.rtc.set_unix_time(unix_secs).map_err(|e| {
                    warn!("Dispatcher: cannot set time: {}", e);
                    ModbusException::SlaveDeviceFailure
                })?;
                Ok(Outcome::Silent)
            }

            function::HEARTBEAT => {
                debug!("Dispatcher: heartbeat");
                self.last_heartbeat_ms = env.now_ms;
                if env.model.missing_heartbeat() {
                    env.model.set_missing_heartbeat(false);
                    env.emit(AppEvent::HeartbeatRestored);
                }
                env.refresh_relay();
                Ok(Outcome::Silent)
            }

            _ => Err(ModbusException::IllegalFunction),
        }
    }
}

fn require(payload: &[u8], expected: usize) -> Result<(), ValidationError> {
    if payload.len() < expected {
        return Err(ValidationError::PayloadTooShort {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}
