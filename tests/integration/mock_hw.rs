//! Mock board and bus rig for integration tests.
//!
//! The board records every relay write so tests can assert on the full
//! output history. The rig wires a real [`Controller`] to the host
//! simulations of the RS-485 bus, NVS and the persistent event log, and
//! drives it with a manually advanced clock.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use relay_minion::adapters::log_sink::JournalSink;
use relay_minion::adapters::nvs::NvsAdapter;
use relay_minion::adapters::rs485::Rs485Adapter;
use relay_minion::adapters::time::SystemRtc;
use relay_minion::app::commands::CommandQueue;
use relay_minion::app::controller::{Controller, ControllerPorts};
use relay_minion::app::ports::{ClockPort, IndicatorPort, LedPattern, RelayOutputPort, SignalPort};
use relay_minion::config::DeviceConfig;
use relay_minion::event_log::EventLog;
use relay_minion::modbus::rtu;
use relay_minion::model::DeviceModel;

// ── MockBoard ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockBoard {
    pub safety: bool,
    pub signal: bool,
    pub output: bool,
    /// Every level written to the relay, in order.
    pub writes: Vec<bool>,
    changed: bool,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the interlock level; reported as a change on the next poll.
    pub fn set_safety(&mut self, ok: bool) {
        if self.safety != ok {
            self.safety = ok;
            self.changed = true;
        }
    }

    pub fn set_signal(&mut self, level: bool) {
        if self.signal != level {
            self.signal = level;
            self.changed = true;
        }
    }

    pub fn energize_count(&self) -> usize {
        self.writes.iter().filter(|&&on| on).count()
    }
}

impl SignalPort for MockBoard {
    fn poll(&mut self) -> bool {
        core::mem::take(&mut self.changed)
    }

    fn safety_ok(&self) -> bool {
        self.safety
    }

    fn signal_level(&self) -> bool {
        self.signal
    }

    fn input(&self, index: u16) -> Option<bool> {
        match index {
            0 => Some(self.safety),
            1 => Some(self.signal),
            _ => None,
        }
    }
}

impl RelayOutputPort for MockBoard {
    fn set_output(&mut self, energized: bool) {
        self.output = energized;
        self.writes.push(energized);
    }

    fn output_level(&self) -> bool {
        self.output
    }
}

// ── MockLeds ──────────────────────────────────────────────────

/// Records the last requested pattern per LED.
#[derive(Debug, Default)]
pub struct MockLeds {
    pub communication: LedPattern,
    pub activity: LedPattern,
}

impl IndicatorPort for MockLeds {
    fn set_communication(&mut self, pattern: LedPattern, _now_ms: u64) {
        self.communication = pattern;
    }

    fn set_activity(&mut self, pattern: LedPattern, _now_ms: u64) {
        self.activity = pattern;
    }
}

// ── MockClock ─────────────────────────────────────────────────

/// Shared millisecond counter; clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct MockClock(Rc<Cell<u64>>);

#[allow(dead_code)]
impl MockClock {
    pub fn set(&self, now_ms: u64) {
        self.0.set(now_ms);
    }
}

impl ClockPort for MockClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type TestJournal = JournalSink<NvsAdapter, MockClock>;
pub type TestController =
    Controller<MockBoard, Rs485Adapter, NvsAdapter, SystemRtc, TestJournal, MockLeds>;

pub struct Rig {
    pub controller: TestController,
    pub commands: Arc<CommandQueue>,
    pub model: Arc<DeviceModel>,
    clock: MockClock,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(DeviceConfig::default())
    }

    /// Boot a controller at t = 0 from `config`.
    pub fn with_config(config: DeviceConfig) -> Self {
        let clock = MockClock::default();
        let model = Arc::new(DeviceModel::new(&config));
        let commands = Arc::new(CommandQueue::new());

        let mut board = MockBoard::new();
        board.safety = true;

        let ports = ControllerPorts {
            io: board,
            bus: Rs485Adapter::new(),
            storage: NvsAdapter::simulated(),
            rtc: SystemRtc::new(),
            journal: JournalSink::new(EventLog::load(NvsAdapter::simulated()), clock.clone()),
            leds: MockLeds::default(),
        };

        let mut controller = Controller::new(Arc::clone(&model), Arc::clone(&commands), ports, 0);
        controller.start(0);

        Self {
            controller,
            commands,
            model,
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn board(&mut self) -> &mut MockBoard {
        &mut self.controller.ports_mut().io
    }

    /// Tick once per millisecond up to and including `until_ms`.
    pub fn run_until(&mut self, until_ms: u64) {
        let mut now = self.now();
        while now < until_ms {
            now += 1;
            self.clock.set(now);
            self.controller.tick(now);
        }
    }

    pub fn advance(&mut self, ms: u64) {
        let until = self.now() + ms;
        self.run_until(until);
    }

    /// Put raw bytes on the wire.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.controller.ports_mut().bus.inject(bytes);
    }

    /// Frames the controller transmitted since the last call.
    pub fn sent(&mut self) -> Vec<Vec<u8>> {
        self.controller.ports_mut().bus.take_sent()
    }

    /// Send `pdu` to `address` and let the line go quiet long enough for
    /// the frame to be dispatched. Returns the PDU of an immediate answer.
    pub fn request(&mut self, address: u8, pdu: &[u8]) -> Option<Vec<u8>> {
        self.inject(&frame(address, pdu));
        self.advance(5);
        self.sent().pop().map(|reply| {
            let adu = rtu::decode(&reply).expect("reply must carry a valid CRC");
            assert_eq!(adu.address, address, "reply from a different address");
            adu.pdu.to_vec()
        })
    }

    /// Read `count` holding registers starting at `start`.
    pub fn read_holding(&mut self, start: u16, count: u16) -> Vec<u16> {
        let address = self.model.address() as u8;
        let reply = self
            .request(address, &read_pdu(0x03, start, count))
            .expect("holding register read must be answered");
        assert_eq!(reply[0], 0x03, "unexpected reply {:02X?}", reply);
        assert_eq!(usize::from(reply[1]), usize::from(count) * 2);
        reply[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect()
    }
}

// ── Frame builders ────────────────────────────────────────────

/// Complete RTU frame for `pdu`.
pub fn frame(address: u8, pdu: &[u8]) -> Vec<u8> {
    rtu::encode(address, pdu)
        .expect("test PDU fits an ADU")
        .to_vec()
}

#[allow(dead_code)]
pub fn read_pdu(function: u8, start: u16, count: u16) -> Vec<u8> {
    let mut pdu = vec![function];
    pdu.extend_from_slice(&start.to_be_bytes());
    pdu.extend_from_slice(&count.to_be_bytes());
    pdu
}

#[allow(dead_code)]
pub fn write_coil_pdu(index: u16, on: bool) -> Vec<u8> {
    let mut pdu = vec![0x05];
    pdu.extend_from_slice(&index.to_be_bytes());
    pdu.extend_from_slice(if on { &[0xFF, 0x00] } else { &[0x00, 0x00] });
    pdu
}

#[allow(dead_code)]
pub fn write_register_pdu(index: u16, value: u16) -> Vec<u8> {
    let mut pdu = vec![0x06];
    pdu.extend_from_slice(&index.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

#[allow(dead_code)]
pub fn heartbeat_pdu() -> Vec<u8> {
    vec![69]
}
