//! Relay minion firmware entry point
//!
//! Hexagonal architecture with a single cooperative control loop and an
//! interactive console on its own thread.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   JournalSink    NvsAdapter   Rs485Adapter    │
//! │  (Signal+Relay)    (EventSink+Log)(Storage)    (Bus)           │
//! │  StatusLeds        SystemRtc      Esp32TimeAdapter             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │               Controller (pure logic)                  │    │
//! │  │  RelayStateMachine · Dispatcher · FrameAccumulator     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                          ▲                                     │
//! │             CommandQueue │ (console thread)                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

mod esp_link_shims;

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use relay_minion::adapters::hardware::HardwareAdapter;
use relay_minion::adapters::log_sink::JournalSink;
use relay_minion::adapters::nvs::NvsAdapter;
use relay_minion::adapters::rs485::Rs485Adapter;
use relay_minion::adapters::time::{Esp32TimeAdapter, SystemRtc};
use relay_minion::app::commands::CommandQueue;
use relay_minion::app::configuration;
use relay_minion::app::console::{Console, PROMPT};
use relay_minion::app::controller::{Controller, ControllerPorts};
use relay_minion::app::ports::{ClockPort, StoragePort};
use relay_minion::config::{BUS_BAUD_RATE, CONTROL_LOOP_PERIOD_MS};
use relay_minion::drivers::digin::SharedInputs;
use relay_minion::drivers::hw_init::{self, Gpio};
use relay_minion::drivers::status_led::StatusLeds;
use relay_minion::drivers::watchdog::Watchdog;
use relay_minion::error::Error;
use relay_minion::event_log::EventLog;
use relay_minion::model::DeviceModel;
use relay_minion::pins;

const CONSOLE_STACK_SIZE: usize = 8 * 1024;
/// Poll interval while the console has no input.
const CONSOLE_IDLE_MS: u64 = 50;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Relay minion v{}                 ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Peripherals ────────────────────────────────────────
    hw_init::init_peripherals(BUS_BAUD_RATE)?;
    let watchdog = Watchdog::new();

    // ── 3. Configuration from NVS ─────────────────────────────
    let nvs = NvsAdapter::new().map_err(Error::from)?;
    let config = configuration::load(&nvs);
    info!(
        "Config: address {}, serial {}, class 0x{:04X}",
        config.address,
        config.serial_number,
        config.class.bits()
    );
    let model = Arc::new(DeviceModel::new(&config));
    let commands = Arc::new(CommandQueue::new());

    // ── 4. Adapters ───────────────────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let inputs = Arc::new(SharedInputs::new());
    let hw = HardwareAdapter::new(
        Gpio(pins::RELAY_GPIO),
        Gpio(pins::SAFETY_GPIO),
        Gpio(pins::SIGNAL_GPIO),
        Arc::clone(&inputs),
    );
    let event_log = EventLog::load(NvsAdapter::new().map_err(Error::from)?);
    info!("Event log: {} entries restored", event_log.len());

    let ports = ControllerPorts {
        io: hw,
        bus: Rs485Adapter::new(),
        storage: nvs,
        rtc: SystemRtc::new(),
        journal: JournalSink::new(event_log, Esp32TimeAdapter::new()),
        leds: StatusLeds::new(Gpio(pins::LED_COMM_GPIO), Gpio(pins::LED_ACTIVITY_GPIO)),
    };

    // ── 5. Controller ─────────────────────────────────────────
    let mut controller = Controller::new(
        Arc::clone(&model),
        Arc::clone(&commands),
        ports,
        clock.now_ms(),
    );
    controller.start(clock.now_ms());

    // ── 6. Console thread ─────────────────────────────────────
    let console = Console::new(model, commands, inputs, NvsAdapter::new().map_err(Error::from)?);
    std::thread::Builder::new()
        .name("console".into())
        .stack_size(CONSOLE_STACK_SIZE)
        .spawn(move || console_task(console))?;

    info!("System ready. Entering control loop.");

    // ── 7. Control loop ───────────────────────────────────────
    let period = Duration::from_millis(u64::from(CONTROL_LOOP_PERIOD_MS));
    loop {
        controller.tick(clock.now_ms());
        watchdog.feed();
        std::thread::sleep(period);
    }
}

fn console_task<S: StoragePort>(mut console: Console<S>) {
    let stdin = std::io::stdin();
    let mut line = String::new();
    prompt();

    loop {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => std::thread::sleep(Duration::from_millis(CONSOLE_IDLE_MS)),
            Ok(_) => {
                print!("{}", console.execute(&line));
                prompt();
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(CONSOLE_IDLE_MS));
            }
            Err(e) => {
                warn!("Console: read failed: {}", e);
                std::thread::sleep(Duration::from_millis(CONSOLE_IDLE_MS));
            }
        }
    }
}

fn prompt() {
    print!("{}", PROMPT);
    let _ = std::io::stdout().flush();
}
