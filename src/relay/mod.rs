//! Relay safety state machine.
//!
//! Function-pointer state table in the classic embedded style:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  StateTable                                               │
//! │  ┌──────────────────────┬───────────┬───────────────────┐ │
//! │  │ RelayState           │ on_enter  │ on_event          │ │
//! │  ├──────────────────────┼───────────┼───────────────────┤ │
//! │  │ Off                  │ fn(..)    │ fn(..)->Option<>  │ │
//! │  │ OffWaitingFeedback   │ -         │ fn(..)->Option<>  │ │
//! │  │ On                   │ -         │ fn(..)->Option<>  │ │
//! │  │ OnWaitingFeedback    │ -         │ fn(..)->Option<>  │ │
//! │  │ Error                │ fn(..)    │ fn(..)->Option<>  │ │
//! │  └──────────────────────┴───────────┴───────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation takes `&mut self`, so transitions cannot interleave.
//! The controller is the only owner; console commands reach it through
//! the [`CommandQueue`](crate::app::commands::CommandQueue).

pub mod context;
pub mod states;

use log::info;

use crate::app::commands::RelayCommand;
use crate::app::events::AppEvent;
use crate::error::SafetyFault;

use context::{RelayCore, RelayEnv, RelayTimer};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RelayState {
    Off = 0,
    OffWaitingFeedback = 1,
    On = 2,
    OnWaitingFeedback = 3,
    Error = 4,
}

impl RelayState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 5;
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    On,
    Off,
    /// Re-evaluate guards without an explicit command.
    Refresh,
    RetryTimer,
    CheckFeedbackTimer,
}

impl From<RelayTimer> for RelayEvent {
    fn from(timer: RelayTimer) -> Self {
        match timer {
            RelayTimer::Retry => Self::RetryTimer,
            RelayTimer::CheckFeedback => Self::CheckFeedbackTimer,
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

pub type StateActionFn = fn(&mut RelayCore, &mut RelayEnv<'_>);

/// Returns `Some(next)` to transition, `None` to stay.
pub type StateEventFn = fn(&mut RelayCore, &mut RelayEnv<'_>, RelayEvent) -> Option<RelayState>;

pub struct StateDescriptor {
    pub id: RelayState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_event: StateEventFn,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RelayStateMachine {
    table: [StateDescriptor; RelayState::COUNT],
    current: usize,
    core: RelayCore,
}

impl Default for RelayStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStateMachine {
    pub fn new() -> Self {
        Self {
            table: states::build_state_table(),
            current: RelayState::Off as usize,
            core: RelayCore::default(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.table[self.current].id
    }

    /// Output commanded on from the bus's point of view.
    pub fn is_on(&self) -> bool {
        self.state() != RelayState::Off
    }

    pub fn attempts(&self) -> u8 {
        self.core.attempts
    }

    pub fn activation_ms(&self) -> Option<u64> {
        self.core.activation_ms
    }

    pub fn check_deadline(&self) -> Option<u64> {
        self.core.check_timer.deadline()
    }

    pub fn retry_deadline(&self) -> Option<u64> {
        self.core.retry_timer.deadline()
    }

    /// Explicit on/off request. A refused `On` leaves the machine in
    /// [`RelayState::Error`] and reports the blocking condition.
    pub fn command(&mut self, command: RelayCommand, env: &mut RelayEnv<'_>) -> Result<(), SafetyFault> {
        let event = match command {
            RelayCommand::On => RelayEvent::On,
            RelayCommand::Off => RelayEvent::Off,
        };
        self.handle(event, env);

        if command == RelayCommand::On && self.state() == RelayState::Error {
            Err(states::blocking_fault(env))
        } else {
            Ok(())
        }
    }

    pub fn refresh(&mut self, env: &mut RelayEnv<'_>) {
        self.handle(RelayEvent::Refresh, env);
    }

    pub fn on_timer_fired(&mut self, timer: RelayTimer, env: &mut RelayEnv<'_>) {
        self.handle(timer.into(), env);
    }

    /// Poll both timer slots; each expired slot re-enters as an event.
    pub fn service_timers(&mut self, env: &mut RelayEnv<'_>) {
        if let Some(timer) = self.core.check_timer.poll(env.now_ms) {
            self.on_timer_fired(timer, env);
        }
        if let Some(timer) = self.core.retry_timer.poll(env.now_ms) {
            self.on_timer_fired(timer, env);
        }
    }

    /// Apply one event to the current state.
    pub fn handle(&mut self, event: RelayEvent, env: &mut RelayEnv<'_>) {
        let next = (self.table[self.current].on_event)(&mut self.core, env, event);
        if let Some(next) = next {
            if next as usize != self.current {
                self.transition(next, env);
            }
        }
    }

    fn transition(&mut self, next: RelayState, env: &mut RelayEnv<'_>) {
        let from = self.state();
        let next_idx = next as usize;

        info!(
            "Relay transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        self.current = next_idx;
        env.sink.emit(&AppEvent::StateChanged { from, to: next });

        if let Some(enter) = self.table[self.current].on_enter {
            enter(&mut self.core, env);
        }
    }
}
