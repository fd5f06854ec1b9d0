//! Interactive service console.
//!
//! Each input line is parsed with `clap` (no binary name) and executed
//! against the shared device model. Relay commands never touch the state
//! machine directly: they are queued for the control loop.
//!
//! | Command                               | Effect                          |
//! |---------------------------------------|---------------------------------|
//! | `SetRele <0\|1>`                      | queue `Off` / `On`              |
//! | `ReadSignals`                         | debounced safety and signal     |
//! | `ReadFB`                              | feedback configuration          |
//! | `SetFB [-o\|--off] <dir> <att> <del>` | disable, or enable and set      |
//! | `ReadSafetyMessage`                   | print safety message            |
//! | `SetSafetyMessage <text>`             | store safety message            |
//! | `ReadFeedbackMessage`                 | print feedback message          |
//! | `SetFeedbackMessage <text>`           | store feedback message          |

use core::fmt::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use crate::drivers::digin::SharedInputs;
use crate::model::DeviceModel;

use super::commands::{CommandQueue, RelayCommand};
use super::configuration;
use super::ports::StoragePort;

pub const PROMPT: &str = "EC-peripheral> ";

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true, disable_version_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ConsoleCommand {
    /// Set relay level
    #[command(name = "SetRele")]
    SetRele {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        value: u8,
    },
    /// Read signal levels
    #[command(name = "ReadSignals")]
    ReadSignals,
    /// Print the current feedback configuration
    #[command(name = "ReadFB")]
    ReadFb,
    /// Set a new feedback configuration
    #[command(name = "SetFB")]
    SetFb {
        /// Disable the feedback mechanism
        #[arg(short = 'o', long = "off")]
        off: bool,
        /// Direction of the feedback signal (0=active low, 1=active high)
        #[arg(required_unless_present = "off")]
        direction: Option<u32>,
        /// Attempts to activate the output (1-8)
        #[arg(required_unless_present = "off")]
        attempts: Option<u32>,
        /// Delay of the feedback check (1-8 seconds)
        #[arg(required_unless_present = "off")]
        delay: Option<u32>,
    },
    /// Print the configured safety warning
    #[command(name = "ReadSafetyMessage")]
    ReadSafetyMessage,
    /// Set a new safety warning
    #[command(name = "SetSafetyMessage")]
    SetSafetyMessage {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Print the configured feedback warning
    #[command(name = "ReadFeedbackMessage")]
    ReadFeedbackMessage,
    /// Set a new feedback warning
    #[command(name = "SetFeedbackMessage")]
    SetFeedbackMessage {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
}

pub struct Console<S: StoragePort> {
    model: Arc<DeviceModel>,
    commands: Arc<CommandQueue>,
    inputs: Arc<SharedInputs>,
    storage: S,
}

impl<S: StoragePort> Console<S> {
    pub fn new(
        model: Arc<DeviceModel>,
        commands: Arc<CommandQueue>,
        inputs: Arc<SharedInputs>,
        storage: S,
    ) -> Self {
        Self {
            model,
            commands,
            inputs,
            storage,
        }
    }

    /// Run one console line and return what should be printed.
    pub fn execute(&mut self, line: &str) -> String {
        if line.trim().is_empty() {
            return String::new();
        }
        match ConsoleLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => self.run(parsed.command),
            Err(e) => e.render().to_string(),
        }
    }

    fn run(&mut self, command: ConsoleCommand) -> String {
        let mut out = String::new();
        match command {
            ConsoleCommand::SetRele { value } => {
                let command = RelayCommand::from(value != 0);
                if self.commands.submit(command).is_err() {
                    out.push_str("Command queue full\n");
                } else {
                    info!("Console: relay {:?} queued", command);
                }
            }
            ConsoleCommand::ReadSignals => {
                let _ = writeln!(
                    out,
                    "Safety={}, Signal={}",
                    u8::from(self.inputs.safety()),
                    u8::from(self.inputs.signal())
                );
            }
            ConsoleCommand::ReadFb => {
                let fb = self.model.feedback();
                if fb.enabled {
                    let _ = writeln!(
                        out,
                        "Feedback direction={}, Activation attempts={}, Feedback delay={}",
                        fb.direction, fb.attempts, fb.delay_secs
                    );
                } else {
                    out.push_str("Feedback disabled\n");
                }
            }
            ConsoleCommand::SetFb {
                off,
                direction,
                attempts,
                delay,
            } => {
                if off {
                    configuration::save_feedback_enabled(&mut self.storage, &self.model, false);
                    return out;
                }
                configuration::save_feedback_enabled(&mut self.storage, &self.model, true);

                let (Some(direction), Some(attempts), Some(delay)) = (direction, attempts, delay)
                else {
                    return out;
                };
                let storage = &mut self.storage;
                let model = &*self.model;

                let ok = u8::try_from(direction).is_ok_and(|d| {
                    configuration::save_feedback_direction(&mut *storage, model, d).is_ok()
                });
                if !ok {
                    let _ = writeln!(out, "Invalid feedback direction value: {}", direction);
                }
                let ok = u8::try_from(attempts).is_ok_and(|a| {
                    configuration::save_output_attempts(&mut *storage, model, a).is_ok()
                });
                if !ok {
                    let _ = writeln!(out, "Invalid activation attempts value: {}", attempts);
                }
                let ok = u8::try_from(delay).is_ok_and(|d| {
                    configuration::save_feedback_delay(&mut *storage, model, d).is_ok()
                });
                if !ok {
                    let _ = writeln!(out, "Invalid feedback delay value: {}", delay);
                }
            }
            ConsoleCommand::ReadSafetyMessage => {
                let _ = writeln!(out, "{}", self.model.safety_message());
            }
            ConsoleCommand::SetSafetyMessage { text } => {
                configuration::save_safety_message(&mut self.storage, &self.model, &text.join(" "));
            }
            ConsoleCommand::ReadFeedbackMessage => {
                let _ = writeln!(out, "{}", self.model.feedback_message());
            }
            ConsoleCommand::SetFeedbackMessage { text } => {
                configuration::save_feedback_message(&mut self.storage, &self.model, &text.join(" "));
            }
        }
        out
    }
}
