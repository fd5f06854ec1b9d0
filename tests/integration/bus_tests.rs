//! Register map and vendor functions, exercised frame by frame over the
//! simulated bus.

use relay_minion::app::configuration;
use relay_minion::modbus::registers::{
    HR_ALARMS, HR_CLASS, HR_FEEDBACK_MESSAGE, HR_LOG_COUNT, HR_LOGS, HR_SAFETY_MESSAGE,
    firmware_version,
};

use super::mock_hw::{Rig, frame, read_pdu, write_coil_pdu, write_register_pdu};

// ── Reads ─────────────────────────────────────────────────────

#[test]
fn identity_registers_after_boot() {
    let mut rig = Rig::new();
    let regs = rig.read_holding(0, 7);
    // address, firmware, class (hw model 1, LIGHT group 1), serial 2, alarms, state
    assert_eq!(regs, vec![1, firmware_version(), 0x1101, 0, 2, 0, 0]);
}

#[test]
fn power_on_is_the_first_log_entry() {
    let mut rig = Rig::new();
    let regs = rig.read_holding(HR_LOG_COUNT, 5);
    assert_eq!(regs[0], 1);
    // uptime hi, uptime lo, code, value
    assert_eq!(&regs[1..], &[0, 0, 1, 0]);
}

#[test]
fn messages_read_as_big_endian_byte_pairs() {
    let mut rig = Rig::new();
    rig.model.set_safety_message("Door open");
    rig.model.set_feedback_message("Lamp");

    let safety = rig.read_holding(HR_SAFETY_MESSAGE, 6);
    assert_eq!(safety, vec![0x446F, 0x6F72, 0x206F, 0x7065, 0x6E00, 0]);

    let feedback = rig.read_holding(HR_FEEDBACK_MESSAGE, 2);
    assert_eq!(feedback, vec![0x4C61, 0x6D70]);
}

#[test]
fn discrete_inputs_follow_the_board() {
    let mut rig = Rig::new();
    rig.board().signal = true;
    rig.board().safety = false;
    let reply = rig.request(1, &read_pdu(0x02, 0, 2)).unwrap();
    assert_eq!(reply, vec![0x02, 1, 0b10]);
}

#[test]
fn alarms_report_an_open_interlock() {
    let mut rig = Rig::new();
    rig.board().set_safety(false);
    assert_eq!(rig.read_holding(HR_ALARMS, 1), vec![0x01]);
}

#[test]
fn gaps_in_the_register_map_read_as_zero() {
    let mut rig = Rig::new();
    assert_eq!(rig.read_holding(200, 1), vec![0]);
    let reply = rig.request(1, &read_pdu(0x03, 160, 16)).unwrap();
    assert_eq!(reply[0], 0x03);
    assert_eq!(reply[1], 32);
    assert!(reply[18..].iter().all(|&b| b == 0));
}

#[test]
fn unmapped_register_writes_are_refused() {
    let mut rig = Rig::new();
    for index in [200, 300] {
        let reply = rig.request(1, &write_register_pdu(index, 5)).unwrap();
        assert_eq!(reply, vec![0x86, 0x01]);
    }
}

#[test]
fn unused_coil_write_is_accepted() {
    let mut rig = Rig::new();
    let reply = rig.request(1, &write_coil_pdu(2, true)).unwrap();
    assert_eq!(reply, write_coil_pdu(2, true));
    assert!(!rig.board().output);
}

#[test]
fn unknown_function_is_illegal() {
    let mut rig = Rig::new();
    let reply = rig.request(1, &[0x2B, 0x0E, 0x01, 0x00]).unwrap();
    assert_eq!(reply, vec![0xAB, 0x01]);
}

// ── Filtering ─────────────────────────────────────────────────

#[test]
fn frames_for_other_devices_are_ignored() {
    let mut rig = Rig::new();
    assert!(rig.request(9, &write_coil_pdu(0, true)).is_none());
    assert!(!rig.board().output);
}

#[test]
fn corrupted_frame_is_dropped_silently() {
    let mut rig = Rig::new();
    let mut bytes = frame(1, &write_coil_pdu(0, true));
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    rig.inject(&bytes);
    rig.advance(5);
    assert!(rig.sent().is_empty());
    assert!(!rig.board().output);
}

#[test]
fn frames_split_across_reads_are_reassembled() {
    let mut rig = Rig::new();
    let bytes = frame(1, &read_pdu(0x03, 0, 1));
    rig.inject(&bytes[..3]);
    rig.advance(1);
    rig.inject(&bytes[3..]);
    rig.advance(5);
    assert_eq!(rig.sent().len(), 1);
}

// ── Writes ────────────────────────────────────────────────────

#[test]
fn broadcast_write_is_applied_without_reply() {
    let mut rig = Rig::new();
    assert!(rig.request(0, &write_register_pdu(HR_CLASS, 0x0203)).is_none());
    assert_eq!(rig.model.class().bits(), 0x0203);
    assert_eq!(rig.read_holding(HR_CLASS, 1), vec![0x1203]);
    assert_eq!(configuration::load(&rig.controller.ports().storage).class.bits(), 0x0203);
}

#[test]
fn class_with_unknown_mode_is_rejected() {
    let mut rig = Rig::new();
    let reply = rig.request(1, &write_register_pdu(HR_CLASS, 0x0901)).unwrap();
    assert_eq!(reply, vec![0x86, 0x03]);
    assert_eq!(rig.model.class().bits(), 0x0101);
}

#[test]
fn multiple_write_is_all_or_nothing() {
    let mut rig = Rig::new();
    // address 5 is fine, firmware version is read-only
    let pdu = [0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x05, 0x00, 0x01];
    let reply = rig.request(1, &pdu).unwrap();
    assert_eq!(reply[0], 0x90);
    assert_eq!(rig.model.address(), 1);
}

#[test]
fn address_write_answers_from_the_old_address() {
    let mut rig = Rig::new();
    let reply = rig.request(1, &write_register_pdu(0, 12)).unwrap();
    assert_eq!(reply, write_register_pdu(0, 12));
    assert_eq!(rig.model.address(), 12);
    assert_eq!(rig.read_holding(0, 1), vec![12]);
    assert_eq!(configuration::load(&rig.controller.ports().storage).address, 12);
}

// ── Vendor functions ──────────────────────────────────────────

#[test]
fn random_serial_number_answers_a_broadcast_once() {
    let mut rig = Rig::new();
    rig.inject(&frame(0, &[65]));
    rig.advance(1_005);
    let sent = rig.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], frame(1, &[65, 0, 0, 0, 2, 0x11, 0x01]));
    assert!(!rig.controller.has_pending_reply());
}

#[test]
fn config_address_matches_on_serial_number() {
    let mut rig = Rig::new();
    assert!(rig.request(0, &[64, 0, 0, 0, 99, 7]).is_none());
    assert_eq!(rig.model.address(), 1);

    assert!(rig.request(0, &[64, 0, 0, 0, 2, 7]).is_none());
    assert_eq!(rig.model.address(), 7);
    assert_eq!(rig.read_holding(0, 1), vec![7]);
}

#[test]
fn set_time_updates_the_wall_clock() {
    let mut rig = Rig::new();
    let mut pdu = vec![68];
    pdu.extend_from_slice(&1_700_000_000_u64.to_be_bytes());
    assert!(rig.request(1, &pdu).is_none());
    assert_eq!(rig.controller.ports().rtc.unix_secs(), Some(1_700_000_000));
}

#[test]
fn short_vendor_payload_is_an_illegal_value() {
    let mut rig = Rig::new();
    let reply = rig.request(1, &[68, 0, 0]).unwrap();
    assert_eq!(reply, vec![68 | 0x80, 0x03]);
}

#[test]
fn log_registers_grow_with_output_changes() {
    let mut rig = Rig::new();
    rig.request(1, &write_coil_pdu(0, true)).unwrap();
    rig.request(1, &write_coil_pdu(0, false)).unwrap();

    let count = rig.read_holding(HR_LOG_COUNT, 1)[0];
    assert_eq!(count, 3);
    let entries = rig.read_holding(HR_LOGS, count * 4);
    let codes: Vec<u16> = entries.chunks_exact(4).map(|e| e[2]).collect();
    assert_eq!(codes, vec![1, 2, 3]);
}
