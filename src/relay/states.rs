//! Concrete state handler functions and table builder.
//!
//! Each state is one row of plain `fn` pointers: an optional `on_enter`
//! action and an `on_event` handler that returns the next state, or
//! `None` to stay.
//!
//! ```text
//!                 On (can_turn_on)
//!   OFF ────────────────────────────────▶ ON ◀──────────────┐
//!    │  ╲                                  │                │ feedback ok
//!    │   ╲ On (supervised + feedback)      │ Refresh        │
//!    │    ╲─────────────────▶ ON_WAITING_FEEDBACK           │
//!    │                          │      ▲   └────────────────┘
//!    │ On (¬can_turn_on)        │ fail │ Retry
//!    ▼                          ▼      │
//!  ERROR                 OFF_WAITING_FEEDBACK
//!
//!  Off from any state ──▶ OFF
//! ```

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::error::SafetyFault;

use super::context::{RelayCore, RelayEnv, RelayTimer};
use super::{RelayEvent, RelayState, StateDescriptor};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; RelayState::COUNT] {
    [
        StateDescriptor {
            id: RelayState::Off,
            name: "Off",
            on_enter: Some(off_enter),
            on_event: off_event,
        },
        StateDescriptor {
            id: RelayState::OffWaitingFeedback,
            name: "OffWaitingFeedback",
            on_enter: None,
            on_event: off_waiting_feedback_event,
        },
        StateDescriptor {
            id: RelayState::On,
            name: "On",
            on_enter: None,
            on_event: on_event,
        },
        StateDescriptor {
            id: RelayState::OnWaitingFeedback,
            name: "OnWaitingFeedback",
            on_enter: None,
            on_event: on_waiting_feedback_event,
        },
        StateDescriptor {
            id: RelayState::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_event: error_event,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared actions
// ═══════════════════════════════════════════════════════════════════════════

/// Energize and decide whether the activation must be verified.
fn turn_on(core: &mut RelayCore, env: &mut RelayEnv<'_>) -> RelayState {
    env.energize(true);
    env.model.set_output_attempts_exceeded(false);

    let (mode, feedback) = env.model.read(|s| (s.class.mode(), s.feedback));
    if mode.is_supervised() {
        core.activation_ms = Some(env.now_ms);
        if feedback.enabled {
            core.attempts = 0;
            core.check_timer
                .arm(env.now_ms, feedback.delay_ms(), RelayTimer::CheckFeedback);
            return RelayState::OnWaitingFeedback;
        }
    }
    RelayState::On
}

/// De-energize and account the elapsed on-time.
fn turn_off(core: &mut RelayCore, env: &mut RelayEnv<'_>) {
    env.energize(false);
    if let Some(start) = core.activation_ms.take() {
        let elapsed_secs = env.now_ms.saturating_sub(start) / 1000;
        env.model
            .add_work_seconds(u32::try_from(elapsed_secs).unwrap_or(u32::MAX));
    }
}

/// Why `can_turn_on` is false right now.
pub(super) fn blocking_fault(env: &RelayEnv<'_>) -> SafetyFault {
    if env.model.missing_heartbeat() {
        SafetyFault::HeartbeatLost
    } else {
        SafetyFault::InterlockOpen
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OFF
// ═══════════════════════════════════════════════════════════════════════════

fn off_enter(core: &mut RelayCore, _env: &mut RelayEnv<'_>) {
    // Off always wins over an in-flight retry/feedback cycle.
    core.disarm_timers();
}

fn off_event(core: &mut RelayCore, env: &mut RelayEnv<'_>, event: RelayEvent) -> Option<RelayState> {
    match event {
        RelayEvent::On if env.can_turn_on() => Some(turn_on(core, env)),
        RelayEvent::On => {
            warn!("Relay: cannot turn on, {}", blocking_fault(env));
            Some(RelayState::Error)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OFF_WAITING_FEEDBACK: output dropped after a failed check, retry pending
// ═══════════════════════════════════════════════════════════════════════════

fn off_waiting_feedback_event(
    core: &mut RelayCore,
    env: &mut RelayEnv<'_>,
    event: RelayEvent,
) -> Option<RelayState> {
    match event {
        RelayEvent::On => {
            // Absorbed: the pending retry carries on with a fresh budget.
            core.attempts = 0;
            None
        }
        RelayEvent::Refresh if !env.can_turn_on() => Some(RelayState::Off),
        RelayEvent::Off => Some(RelayState::Off),
        RelayEvent::RetryTimer => {
            env.energize(true);
            let delay_ms = env.model.feedback().delay_ms();
            core.check_timer
                .arm(env.now_ms, delay_ms, RelayTimer::CheckFeedback);
            Some(RelayState::OnWaitingFeedback)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ON
// ═══════════════════════════════════════════════════════════════════════════

fn on_event(core: &mut RelayCore, env: &mut RelayEnv<'_>, event: RelayEvent) -> Option<RelayState> {
    match event {
        RelayEvent::Off => {
            turn_off(core, env);
            Some(RelayState::Off)
        }
        RelayEvent::Refresh if !env.can_turn_on() => {
            turn_off(core, env);
            Some(RelayState::Error)
        }
        RelayEvent::Refresh if env.model.feedback().enabled && !env.feedback_matches() => {
            info!("Relay: feedback lost while on, scheduling retry");
            turn_off(core, env);
            let delay_ms = env.model.feedback().delay_ms();
            core.retry_timer.arm(env.now_ms, delay_ms, RelayTimer::Retry);
            Some(RelayState::OffWaitingFeedback)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ON_WAITING_FEEDBACK: energized, feedback check pending
// ═══════════════════════════════════════════════════════════════════════════

fn on_waiting_feedback_event(
    core: &mut RelayCore,
    env: &mut RelayEnv<'_>,
    event: RelayEvent,
) -> Option<RelayState> {
    match event {
        // No work-time accounting on this path; the activation stamp is kept.
        RelayEvent::Off => {
            env.energize(false);
            Some(RelayState::Off)
        }
        RelayEvent::Refresh if !env.can_turn_on() => {
            env.energize(false);
            Some(RelayState::Off)
        }
        RelayEvent::CheckFeedbackTimer => {
            if env.feedback_matches() {
                core.attempts = 0;
                return Some(RelayState::On);
            }

            let allowed = env.model.feedback().attempts;
            if u16::from(core.attempts) + 1 < u16::from(allowed) {
                core.attempts += 1;
                warn!("Relay: feedback check failed (attempt {}/{})", core.attempts, allowed);
                env.sink.emit(&AppEvent::FeedbackRetry {
                    attempt: core.attempts,
                });
                env.energize(false);
                let delay_ms = env.model.feedback().delay_ms();
                core.retry_timer.arm(env.now_ms, delay_ms, RelayTimer::Retry);
                Some(RelayState::OffWaitingFeedback)
            } else {
                warn!("Relay: feedback check failed, {} attempts exhausted", allowed);
                env.model.set_output_attempts_exceeded(true);
                env.sink
                    .emit(&AppEvent::SafetyFault(SafetyFault::FeedbackExhausted));
                env.energize(false);
                Some(RelayState::Off)
            }
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR: refused to energize; recovers once the guard passes again
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(_core: &mut RelayCore, env: &mut RelayEnv<'_>) {
    let fault = blocking_fault(env);
    env.sink.emit(&AppEvent::SafetyFault(fault));
}

fn error_event(core: &mut RelayCore, env: &mut RelayEnv<'_>, event: RelayEvent) -> Option<RelayState> {
    match event {
        RelayEvent::Off => Some(RelayState::Off),
        RelayEvent::On | RelayEvent::Refresh if env.can_turn_on() => Some(turn_on(core, env)),
        _ => None,
    }
}
