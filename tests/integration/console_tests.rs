//! Console commands reaching the control loop through the command queue.

use std::sync::Arc;

use relay_minion::adapters::nvs::NvsAdapter;
use relay_minion::app::configuration;
use relay_minion::app::console::Console;
use relay_minion::drivers::digin::SharedInputs;
use relay_minion::modbus::registers::HR_SAFETY_MESSAGE;
use relay_minion::relay::RelayState;

use super::mock_hw::Rig;

fn console(rig: &Rig) -> Console<NvsAdapter> {
    Console::new(
        Arc::clone(&rig.model),
        Arc::clone(&rig.commands),
        Arc::new(SharedInputs::new()),
        NvsAdapter::simulated(),
    )
}

#[test]
fn set_rele_is_applied_on_the_next_tick() {
    let mut rig = Rig::new();
    let mut console = console(&rig);

    console.execute("SetRele 1");
    assert!(!rig.board().output);

    rig.advance(1);
    assert!(rig.board().output);
    assert_eq!(rig.controller.relay().state(), RelayState::On);

    console.execute("SetRele 0");
    rig.advance(1);
    assert!(!rig.board().output);
}

#[test]
fn safety_message_is_visible_on_the_bus() {
    let mut rig = Rig::new();
    let mut console = console(&rig);

    console.execute("SetSafetyMessage Door open");
    assert_eq!(rig.read_holding(HR_SAFETY_MESSAGE, 2), vec![0x446F, 0x6F72]);
}

#[test]
fn feedback_change_governs_the_next_activation() {
    let mut rig = Rig::new();
    let mut console = console(&rig);

    let out = console.execute("SetFB 1 2 3");
    assert!(!out.contains("Invalid"), "{}", out);
    let fb = rig.model.feedback();
    assert_eq!((fb.direction, fb.attempts, fb.delay_secs), (1, 2, 3));

    console.execute("SetFB --off");
    assert!(!rig.model.feedback().enabled);
}

#[test]
fn console_storage_is_independent_of_the_controller() {
    let rig = Rig::new();
    let mut console = console(&rig);
    console.execute("SetFeedbackMessage Lamp fault");

    // Persisted through the console's own adapter, not the controller's.
    assert!(configuration::load(&rig.controller.ports().storage)
        .feedback_message
        .is_empty());
    assert_eq!(rig.model.feedback_message().as_str(), "Lamp fault");
}
