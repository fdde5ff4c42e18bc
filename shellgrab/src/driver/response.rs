//! Result type for one executed command.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::channel::Detection;
use crate::inventory::CommandSpec;
use crate::output::ArtifactKind;

/// Whether the prompt came back before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    /// The privileged prompt was matched.
    Completed,
    /// The deadline passed; the output is partial.
    TimedOut,
}

/// Output of a command executed on one host.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// The command that was executed.
    pub command: CommandSpec,

    /// Everything captured after the command was sent, echo and prompt included.
    pub output: String,

    /// How collection ended.
    pub completion: Completion,

    /// Time from send to prompt (or deadline).
    pub elapsed: Duration,

    /// Artifact family the output belongs to.
    pub destination: ArtifactKind,

    /// Wall-clock time collection ended.
    pub finished_at: DateTime<Local>,
}

impl CommandResult {
    /// Build a result from a finished prompt wait.
    pub fn from_detection(
        command: CommandSpec,
        detection: Detection,
        elapsed: Duration,
        destination: ArtifactKind,
    ) -> Self {
        let completion = if detection.timed_out() {
            Completion::TimedOut
        } else {
            Completion::Completed
        };
        Self {
            command,
            output: detection.output,
            completion,
            elapsed,
            destination,
            finished_at: Local::now(),
        }
    }

    /// Check if the prompt was seen.
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Completed
    }
}
