//! Inbound relay commands and the queue that carries them.
//!
//! The console runs in its own thread but must not apply state-machine
//! transitions itself. It submits [`RelayCommand`]s to a [`CommandQueue`]
//! that the control loop drains once per tick, so every transition is
//! applied from a single execution context.
//!
//! ```text
//! ┌──────────────┐  RelayCommand  ┌──────────────┐
//! │   Console    │───────────────▶│ Control Loop │
//! │  (thread)    │                │  (main task) │
//! └──────────────┘                └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Explicit output request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    On,
    Off,
}

impl From<bool> for RelayCommand {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Queue depth for console-originated commands.
const COMMAND_DEPTH: usize = 8;

/// Bounded multi-producer queue consumed by the control loop.
pub struct CommandQueue {
    channel: Channel<CriticalSectionRawMutex, RelayCommand, COMMAND_DEPTH>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without blocking. Hands the command back when the queue is full.
    pub fn submit(&self, command: RelayCommand) -> Result<(), RelayCommand> {
        self.channel.try_send(command).map_err(|e| match e {
            embassy_sync::channel::TrySendError::Full(c) => c,
        })
    }

    /// Next pending command, if any.
    pub fn next(&self) -> Option<RelayCommand> {
        self.channel.try_receive().ok()
    }
}
