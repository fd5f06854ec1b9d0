//! End-to-end relay scenarios: bus command in, output and registers out.

use relay_minion::app::configuration;
use relay_minion::app::ports::LedPattern;
use relay_minion::config::{DeviceConfig, FeedbackConfig};
use relay_minion::model::class::{DeviceClass, DeviceMode};
use relay_minion::modbus::registers::{HR_ALARMS, HR_LOG_COUNT, HR_LOGS, HR_STATE};
use relay_minion::relay::RelayState;

use super::mock_hw::{Rig, heartbeat_pdu, read_pdu, write_coil_pdu};

fn config(mode: DeviceMode, feedback: FeedbackConfig) -> DeviceConfig {
    DeviceConfig {
        class: DeviceClass::new(mode, 1),
        feedback,
        ..DeviceConfig::default()
    }
}

fn feedback(attempts: u8, delay_secs: u8) -> FeedbackConfig {
    FeedbackConfig {
        enabled: true,
        direction: 1,
        attempts,
        delay_secs,
    }
}

fn no_feedback() -> FeedbackConfig {
    FeedbackConfig {
        enabled: false,
        ..FeedbackConfig::default()
    }
}

// ── Unsupervised output ───────────────────────────────────────

#[test]
fn light_follows_the_coil() {
    let mut rig = Rig::new();
    let pdu = write_coil_pdu(0, true);
    assert_eq!(rig.request(1, &pdu), Some(pdu));
    assert!(rig.board().output);
    assert_eq!(rig.read_holding(HR_STATE, 1), vec![1]);

    let coils = rig.request(1, &read_pdu(0x01, 0, 2)).unwrap();
    assert_eq!(coils, vec![0x01, 1, 0b11]);

    rig.request(1, &write_coil_pdu(0, false)).unwrap();
    assert!(!rig.board().output);
    assert_eq!(rig.controller.relay().state(), RelayState::Off);
}

#[test]
fn light_ignores_the_interlock() {
    let mut rig = Rig::new();
    rig.board().set_safety(false);
    rig.advance(1);
    assert!(rig.request(1, &write_coil_pdu(0, true)).is_some());
    assert!(rig.board().output);
}

// ── Feedback supervision ──────────────────────────────────────

#[test]
fn uvc_confirmed_by_feedback_stays_on() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, feedback(3, 1)));
    rig.board().signal = true;

    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert_eq!(rig.controller.relay().state(), RelayState::OnWaitingFeedback);
    assert!(rig.board().output);

    rig.advance(1_000);
    assert_eq!(rig.controller.relay().state(), RelayState::On);
    assert_eq!(rig.board().energize_count(), 1);
    assert_eq!(rig.controller.ports().leds.activity, LedPattern::Solid);
}

#[test]
fn uvc_without_feedback_exhausts_its_attempts() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, feedback(2, 1)));

    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    // check fails, retry after 1 s, check fails again
    rig.advance(3_100);

    assert_eq!(rig.controller.relay().state(), RelayState::Off);
    assert!(!rig.board().output);
    assert_eq!(rig.board().energize_count(), 2);
    assert!(rig.model.output_attempts_exceeded());
    assert_eq!(rig.read_holding(HR_ALARMS, 1), vec![0x02]);
    assert_eq!(rig.controller.ports().leds.activity, LedPattern::DoubleBlink);

    let count = rig.read_holding(HR_LOG_COUNT, 1)[0];
    let entries = rig.read_holding(HR_LOGS, count * 4);
    let codes: Vec<u16> = entries.chunks_exact(4).map(|e| e[2]).collect();
    assert_eq!(codes, vec![1, 2, 3, 2, 5, 3]);
}

#[test]
fn new_activation_clears_the_attempts_alarm() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, feedback(1, 1)));
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    rig.advance(1_100);
    assert!(rig.model.output_attempts_exceeded());

    rig.board().signal = true;
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert!(!rig.model.output_attempts_exceeded());
    rig.advance(1_000);
    assert_eq!(rig.controller.relay().state(), RelayState::On);
}

#[test]
fn lost_feedback_while_on_schedules_a_retry() {
    let mut rig = Rig::with_config(config(DeviceMode::Esf, feedback(3, 1)));
    rig.board().signal = true;
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    rig.advance(1_000);
    assert_eq!(rig.controller.relay().state(), RelayState::On);

    rig.board().set_signal(false);
    rig.advance(1);
    assert_eq!(rig.controller.relay().state(), RelayState::OffWaitingFeedback);
    assert!(!rig.board().output);

    rig.board().signal = true;
    rig.advance(2_100);
    assert_eq!(rig.controller.relay().state(), RelayState::On);
    assert!(rig.board().output);
}

// ── Interlock and heartbeat ───────────────────────────────────

#[test]
fn open_interlock_refuses_uvc_until_closed() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, no_feedback()));
    rig.board().set_safety(false);
    rig.advance(1);

    let reply = rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert_eq!(reply, vec![0x85, 0x04]);
    assert_eq!(rig.controller.relay().state(), RelayState::Error);
    assert!(!rig.board().output);

    rig.board().set_safety(true);
    rig.advance(1);
    assert_eq!(rig.controller.relay().state(), RelayState::On);
    assert!(rig.board().output);
}

#[test]
fn safety_bypass_coil_allows_uvc_with_open_interlock() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, no_feedback()));
    rig.board().set_safety(false);
    rig.advance(1);

    rig.request(1, &write_coil_pdu(1, true)).unwrap();
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert!(rig.board().output);
    assert_eq!(rig.read_holding(HR_ALARMS, 1), vec![0x01]);
}

#[test]
fn interlock_opening_drops_an_energized_uvc() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, no_feedback()));
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert!(rig.board().output);

    rig.board().set_safety(false);
    rig.advance(1);
    assert!(!rig.board().output);
    assert_eq!(rig.controller.relay().state(), RelayState::Error);
}

#[test]
fn heartbeat_loss_forces_uvc_off_and_recovery_restores_it() {
    let mut rig = Rig::with_config(config(DeviceMode::Uvc, no_feedback()));
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert_eq!(rig.controller.ports().leds.communication, LedPattern::Solid);

    rig.run_until(10_050);
    assert!(rig.model.missing_heartbeat());
    assert!(!rig.board().output);
    assert_eq!(rig.controller.relay().state(), RelayState::Error);
    assert_eq!(rig.controller.ports().leds.communication, LedPattern::SlowBlink);
    assert_eq!(rig.controller.ports().leds.activity, LedPattern::FastBlink);

    assert!(rig.request(0, &heartbeat_pdu()).is_none());
    assert!(!rig.model.missing_heartbeat());
    assert!(rig.board().output);
    assert_eq!(rig.controller.relay().state(), RelayState::On);
    assert_eq!(rig.controller.ports().leds.communication, LedPattern::Solid);
}

#[test]
fn regular_heartbeats_keep_the_output_alive() {
    let mut rig = Rig::with_config(config(DeviceMode::Esf, no_feedback()));
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    for _ in 0..6 {
        rig.advance(4_000);
        assert!(rig.request(1, &heartbeat_pdu()).is_none());
    }
    assert!(!rig.model.missing_heartbeat());
    assert!(rig.board().output);
}

#[test]
fn network_initialization_turns_the_output_off() {
    let mut rig = Rig::new();
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    assert!(rig.request(0, &[66]).is_none());
    assert!(!rig.board().output);
}

#[test]
fn class_output_targets_a_matching_class_only() {
    let mut rig = Rig::new();
    // class 0x1102 does not match LIGHT group 1
    assert!(rig.request(0, &[67, 0x11, 0x02, 1, 0]).is_none());
    assert!(!rig.board().output);

    assert!(rig.request(0, &[67, 0x11, 0x01, 1, 0]).is_none());
    assert!(rig.board().output);

    assert!(rig.request(0, &[67, 0x11, 0x01, 0, 0]).is_none());
    assert!(!rig.board().output);
}

// ── Work time ─────────────────────────────────────────────────

#[test]
fn work_time_is_persisted_once_a_minute() {
    let mut rig = Rig::with_config(config(DeviceMode::Esf, no_feedback()));
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    rig.advance(5_000);
    rig.request(1, &write_coil_pdu(0, false)).unwrap();
    assert_eq!(rig.model.work_seconds(), 5);
    assert!(rig.model.work_dirty());

    rig.run_until(59_000);
    let stored = configuration::load(&rig.controller.ports().storage);
    assert_eq!(stored.work_seconds, 0);

    rig.run_until(60_010);
    let stored = configuration::load(&rig.controller.ports().storage);
    assert_eq!(stored.work_seconds, 5);
    assert!(!rig.model.work_dirty());
}

#[test]
fn work_hours_register_resets_on_write() {
    let mut config = config(DeviceMode::Esf, no_feedback());
    config.work_seconds = 7_300;
    let mut rig = Rig::with_config(config);
    assert_eq!(rig.read_holding(256, 1), vec![2]);

    rig.request(1, &[0x06, 0x01, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(rig.model.work_seconds(), 0);
    assert_eq!(rig.read_holding(256, 1), vec![0]);
}
