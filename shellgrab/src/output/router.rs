//! Classification of command output into artifacts.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::config::SessionSettings;
use crate::driver::CommandResult;
use crate::inventory::CommandSpec;

/// Destination family of a command's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactKind {
    /// Configuration snapshot, one per dump command.
    Config,
    /// Session transcript shared by every other command of a host.
    Transcript,
}

/// Identity of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    /// Host the output came from.
    pub host: String,
    /// Artifact family.
    pub kind: ArtifactKind,
    /// `YYYYmmddHHMMSS` stamp: capture time for configs, session start for transcripts.
    pub stamp: String,
}

/// How the body is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing content.
    Replace,
    /// Append after existing content.
    Append,
}

/// A routed piece of output ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: ArtifactKey,
    pub mode: WriteMode,
    pub body: String,
}

/// Routes command results to config or transcript artifacts.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    config_dump_commands: Vec<String>,
}

impl OutputRouter {
    /// Create a router; `config_dump_commands` are matched case-insensitively
    /// anywhere in the command text.
    pub fn new<I, T>(config_dump_commands: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            config_dump_commands: config_dump_commands
                .into_iter()
                .map(|c| c.as_ref().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Build a router from session settings.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(&settings.config_dump_commands)
    }

    /// Destination for a command.
    pub fn classify(&self, command: &CommandSpec) -> ArtifactKind {
        let text = command.as_str().to_lowercase();
        if self.config_dump_commands.iter().any(|c| text.contains(c.as_str())) {
            ArtifactKind::Config
        } else {
            ArtifactKind::Transcript
        }
    }

    /// Turn a command result into the artifact it belongs to.
    pub fn route(&self, host: &str, session_start: &DateTime<Local>, result: &CommandResult) -> Artifact {
        match result.destination {
            ArtifactKind::Config => Artifact {
                key: ArtifactKey {
                    host: host.to_string(),
                    kind: ArtifactKind::Config,
                    stamp: timestamp(&result.finished_at),
                },
                mode: WriteMode::Replace,
                body: result.output.clone(),
            },
            ArtifactKind::Transcript => {
                let header = transcript_header(result.command.as_str());
                let mut body = String::with_capacity(header.len() + result.output.len());
                body.push_str(&header);
                body.push_str(&result.output);
                Artifact {
                    key: ArtifactKey {
                        host: host.to_string(),
                        kind: ArtifactKind::Transcript,
                        stamp: timestamp(session_start),
                    },
                    mode: WriteMode::Append,
                    body,
                }
            }
        }
    }
}

impl Default for OutputRouter {
    fn default() -> Self {
        Self::new(["show run"])
    }
}

/// File-name timestamp.
pub fn timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Line framing one command's output inside a transcript.
pub fn transcript_header(command: &str) -> String {
    format!("\n--- Output for command: {command} ---\n")
}
