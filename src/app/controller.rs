//! Control loop, the hexagonal core's orchestrator.
//!
//! [`Controller`] owns the relay state machine, the register dispatcher and
//! the RTU frame accumulator. All I/O flows through the port traits bundled
//! in [`ControllerPorts`], so the whole loop runs on the host with mock
//! adapters.
//!
//! ```text
//!   BusPort ──▶ FrameAccumulator ──▶ Dispatcher ──▶ Reply ──▶ BusPort
//!                                        │
//!   CommandQueue ─────────────────▶ RelayStateMachine ◀── timers / inputs
//!                                        │
//!                                   IndicatorPort, Journal, StoragePort
//! ```
//!
//! One `tick()` per millisecond:
//!
//! 1. pull bus bytes, dispatch a complete frame, send or schedule the reply
//! 2. apply queued console commands
//! 3. fire expired relay timers
//! 4. flag a missing heartbeat
//! 5. refresh the relay on a debounced input change
//! 6. persist dirty work seconds, at most once a minute
//! 7. send a delayed reply whose time has come
//! 8. update the status LEDs

use std::sync::Arc;

use log::{info, warn};

use crate::config::{BUS_BAUD_RATE, WORK_SAVE_INTERVAL_MS};
use crate::model::DeviceModel;
use crate::modbus::{DispatchEnv, Dispatcher, Frame, FrameAccumulator, Reply};
use crate::relay::{RelayState, RelayStateMachine};
use crate::relay::context::RelayEnv;
use crate::timer::{TimerSlot, is_expired};

use super::commands::{CommandQueue, RelayCommand};
use super::configuration;
use super::events::AppEvent;
use super::ports::{BusPort, IndicatorPort, Journal, LedPattern, RelayIo, RtcPort, StoragePort};

/// Bytes pulled from the bus per read call.
const BUS_CHUNK: usize = 64;

/// Adapters the controller drives.
pub struct ControllerPorts<IO, B, S, R, J, L> {
    pub io: IO,
    pub bus: B,
    pub storage: S,
    pub rtc: R,
    pub journal: J,
    pub leds: L,
}

pub struct Controller<IO, B, S, R, J, L> {
    model: Arc<DeviceModel>,
    commands: Arc<CommandQueue>,
    relay: RelayStateMachine,
    dispatcher: Dispatcher,
    accumulator: FrameAccumulator,
    pending_reply: TimerSlot<Frame>,
    work_save_ms: u64,
    ports: ControllerPorts<IO, B, S, R, J, L>,
}

impl<IO, B, S, R, J, L> Controller<IO, B, S, R, J, L>
where
    IO: RelayIo,
    B: BusPort,
    S: StoragePort,
    R: RtcPort,
    J: Journal,
    L: IndicatorPort,
{
    /// Build the controller. Call [`start`](Self::start) before the first tick.
    pub fn new(
        model: Arc<DeviceModel>,
        commands: Arc<CommandQueue>,
        ports: ControllerPorts<IO, B, S, R, J, L>,
        now_ms: u64,
    ) -> Self {
        let seed = u64::from(model.serial_number());
        Self {
            model,
            commands,
            relay: RelayStateMachine::new(),
            dispatcher: Dispatcher::new(seed, now_ms),
            accumulator: FrameAccumulator::new(BUS_BAUD_RATE),
            pending_reply: TimerSlot::new(),
            work_save_ms: 0,
            ports,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Record power-on and drive the relay to a known OFF state.
    pub fn start(&mut self, now_ms: u64) {
        self.ports.journal.emit(&AppEvent::Started);
        self.command(RelayCommand::Off, now_ms);
        info!(
            "Controller started: address {}, class 0x{:04X}, serial {}",
            self.model.address(),
            self.model.class_register(),
            self.model.serial_number()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    pub fn tick(&mut self, now_ms: u64) {
        self.service_bus(now_ms);

        while let Some(command) = self.commands.next() {
            self.command(command, now_ms);
        }

        {
            let Self { model, relay, ports, .. } = self;
            let mut env = RelayEnv::new(&**model, &mut ports.io, ports.journal.as_sink(), now_ms);
            relay.service_timers(&mut env);
        }

        {
            let Self { model, relay, dispatcher, ports, .. } = self;
            let mut env = DispatchEnv {
                model: &**model,
                relay,
                io: &mut ports.io,
                storage: &mut ports.storage,
                rtc: &mut ports.rtc,
                journal: &mut ports.journal,
                now_ms,
            };
            dispatcher.check_heartbeat(&mut env);
        }

        if self.ports.io.poll() {
            self.refresh(now_ms);
        }

        self.save_work_time(now_ms);

        if let Some(frame) = self.pending_reply.poll(now_ms) {
            self.send(&frame);
        }

        self.update_leds(now_ms);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn relay(&self) -> &RelayStateMachine {
        &self.relay
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn has_pending_reply(&self) -> bool {
        self.pending_reply.is_armed()
    }

    pub fn ports(&self) -> &ControllerPorts<IO, B, S, R, J, L> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut ControllerPorts<IO, B, S, R, J, L> {
        &mut self.ports
    }

    // ── Internal ──────────────────────────────────────────────

    fn service_bus(&mut self, now_ms: u64) {
        let mut buf = [0u8; BUS_CHUNK];
        loop {
            let n = self.ports.bus.read(&mut buf);
            if n == 0 {
                break;
            }
            self.accumulator.feed(&buf[..n], now_ms);
            if n < buf.len() {
                break;
            }
        }

        let Some(frame) = self.accumulator.poll(now_ms) else {
            return;
        };

        let reply = {
            let Self { model, relay, dispatcher, ports, .. } = self;
            let mut env = DispatchEnv {
                model: &**model,
                relay,
                io: &mut ports.io,
                storage: &mut ports.storage,
                rtc: &mut ports.rtc,
                journal: &mut ports.journal,
                now_ms,
            };
            dispatcher.handle_frame(&frame, &mut env)
        };

        match reply {
            Reply::None => {}
            Reply::Immediate(frame) => self.send(&frame),
            Reply::Delayed { delay_ms, frame } => {
                self.pending_reply.arm(now_ms, delay_ms, frame);
            }
        }
    }

    fn command(&mut self, command: RelayCommand, now_ms: u64) {
        let Self { model, relay, ports, .. } = self;
        let mut env = RelayEnv::new(&**model, &mut ports.io, ports.journal.as_sink(), now_ms);
        if let Err(fault) = relay.command(command, &mut env) {
            warn!("Controller: {:?} refused: {}", command, fault);
        }
    }

    fn refresh(&mut self, now_ms: u64) {
        let Self { model, relay, ports, .. } = self;
        let mut env = RelayEnv::new(&**model, &mut ports.io, ports.journal.as_sink(), now_ms);
        relay.refresh(&mut env);
    }

    fn save_work_time(&mut self, now_ms: u64) {
        if !self.model.work_dirty() {
            self.work_save_ms = 0;
            return;
        }
        if !is_expired(self.work_save_ms, now_ms, WORK_SAVE_INTERVAL_MS) {
            return;
        }
        if let Some(seconds) = self.model.take_dirty_work_seconds() {
            configuration::save_work_seconds(&mut self.ports.storage, seconds);
            self.ports.journal.emit(&AppEvent::WorkTimeSaved(seconds));
        }
        self.work_save_ms = now_ms;
    }

    fn send(&mut self, frame: &[u8]) {
        if let Err(e) = self.ports.bus.write(frame) {
            warn!("Controller: reply not sent: {}", e);
        }
    }

    fn update_leds(&mut self, now_ms: u64) {
        let (missing, exceeded) = self
            .model
            .read(|s| (s.missing_heartbeat, s.output_attempts_exceeded));
        let activity = activity_pattern(self.relay.state(), !exceeded, self.ports.io.safety_ok());
        self.ports.leds.set_communication(communication_pattern(!missing), now_ms);
        self.ports.leds.set_activity(activity, now_ms);
    }
}

fn communication_pattern(heartbeat_ok: bool) -> LedPattern {
    if heartbeat_ok {
        LedPattern::Solid
    } else {
        LedPattern::SlowBlink
    }
}

/// Exhausted attempts outrank a live fault; a healthy output is solid.
fn activity_pattern(state: RelayState, attempts_ok: bool, safety_ok: bool) -> LedPattern {
    let on = state != RelayState::Off;
    if !attempts_ok {
        LedPattern::DoubleBlink
    } else if state == RelayState::Error || (on && !safety_ok) {
        LedPattern::FastBlink
    } else if on {
        LedPattern::Solid
    } else {
        LedPattern::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;
    use crate::adapters::rs485::Rs485Adapter;
    use crate::adapters::time::SystemRtc;
    use crate::app::ports::{EventLogPort, EventSink, RelayOutputPort, SignalPort};
    use crate::config::DeviceConfig;
    use crate::event_log::EVENT_ENTRY_SIZE;

    #[derive(Default)]
    struct Board {
        safety: bool,
        output: bool,
    }

    impl SignalPort for Board {
        fn poll(&mut self) -> bool {
            false
        }
        fn safety_ok(&self) -> bool {
            self.safety
        }
        fn signal_level(&self) -> bool {
            false
        }
        fn input(&self, _index: u16) -> Option<bool> {
            None
        }
    }

    impl RelayOutputPort for Board {
        fn set_output(&mut self, energized: bool) {
            self.output = energized;
        }
        fn output_level(&self) -> bool {
            self.output
        }
    }

    #[derive(Default)]
    struct Events(Vec<AppEvent>);

    impl EventSink for Events {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(*event);
        }
    }

    impl EventLogPort for Events {
        fn count(&self) -> u16 {
            0
        }
        fn serialize(&self, _index: usize) -> Option<[u8; EVENT_ENTRY_SIZE]> {
            None
        }
    }

    #[derive(Default)]
    struct Leds(LedPattern, LedPattern);

    impl IndicatorPort for Leds {
        fn set_communication(&mut self, pattern: LedPattern, _now_ms: u64) {
            self.0 = pattern;
        }
        fn set_activity(&mut self, pattern: LedPattern, _now_ms: u64) {
            self.1 = pattern;
        }
    }

    type TestController = Controller<Board, Rs485Adapter, NvsAdapter, SystemRtc, Events, Leds>;

    fn controller() -> (TestController, Arc<CommandQueue>) {
        let model = Arc::new(DeviceModel::new(&DeviceConfig::default()));
        let queue = Arc::new(CommandQueue::new());
        let ports = ControllerPorts {
            io: Board::default(),
            bus: Rs485Adapter::new(),
            storage: NvsAdapter::simulated(),
            rtc: SystemRtc::new(),
            journal: Events::default(),
            leds: Leds::default(),
        };
        let mut c = Controller::new(model, Arc::clone(&queue), ports, 0);
        c.start(0);
        (c, queue)
    }

    #[test]
    fn start_logs_power_on() {
        let (c, _) = controller();
        assert_eq!(c.ports().journal.0.first(), Some(&AppEvent::Started));
        assert_eq!(c.relay().state(), RelayState::Off);
    }

    #[test]
    fn queued_commands_applied_on_tick() {
        let (mut c, queue) = controller();
        queue.submit(RelayCommand::On).unwrap();
        assert!(!c.ports().io.output);
        c.tick(1);
        assert!(c.ports().io.output);
        assert_eq!(c.relay().state(), RelayState::On);
    }

    #[test]
    fn leds_follow_heartbeat_and_activity() {
        let (mut c, queue) = controller();
        c.ports_mut().io.safety = true;
        c.tick(1);
        assert_eq!(
            (c.ports().leds.0, c.ports().leds.1),
            (LedPattern::Solid, LedPattern::Off)
        );

        queue.submit(RelayCommand::On).unwrap();
        c.tick(2);
        assert_eq!(c.ports().leds.1, LedPattern::Solid);

        c.tick(10_002);
        assert!(c.model().missing_heartbeat());
        assert_eq!(c.ports().leds.0, LedPattern::SlowBlink);
    }

    #[test]
    fn activity_pattern_reports_faults() {
        use RelayState::*;
        assert_eq!(activity_pattern(Off, true, true), LedPattern::Off);
        assert_eq!(activity_pattern(On, true, true), LedPattern::Solid);
        assert_eq!(activity_pattern(OnWaitingFeedback, true, true), LedPattern::Solid);
        assert_eq!(activity_pattern(On, true, false), LedPattern::FastBlink);
        assert_eq!(activity_pattern(Error, true, true), LedPattern::FastBlink);
        assert_eq!(activity_pattern(Off, false, true), LedPattern::DoubleBlink);
        assert_eq!(activity_pattern(Error, false, false), LedPattern::DoubleBlink);
    }
}
