//! Session behaviour settings.
//!
//! [`SessionSettings`] holds every knob the session protocol uses: deadlines,
//! settle intervals, the prompt markers and the directives sent to the
//! device. Defaults match a Cisco-style CLI. A JSON file can override any
//! subset of fields, see [`SettingsFile`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::channel::MatchMode;
use crate::error::{ConfigError, Result};

/// Settings shared by every host task in a run.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Deadline for every prompt wait (classification, paging, each command).
    pub timeout: Duration,

    /// Pause after the shell opens, before classification.
    pub shell_settle: Duration,

    /// Pause after each escalation write.
    pub escalation_settle: Duration,

    /// Pause after writing a command, before collecting its output.
    pub command_settle: Duration,

    /// Longest single read wait while polling for a prompt.
    pub poll_tick: Duration,

    /// How many trailing bytes of the buffer are searched for the prompt.
    pub search_depth: usize,

    /// Final character of an unprivileged prompt.
    pub unprivileged_marker: char,

    /// Final character of a privileged prompt.
    pub privileged_marker: char,

    /// Prompt matching strategy.
    pub match_mode: MatchMode,

    /// Line sent to request privileged mode.
    pub escalate_command: String,

    /// Line sent once to turn off output paging.
    pub paging_command: String,

    /// Command-text fragments (case-insensitive) that identify a configuration dump.
    pub config_dump_commands: Vec<String>,

    /// A command line consisting only of this marker is skipped.
    pub delimiter: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            shell_settle: Duration::from_secs(2),
            escalation_settle: Duration::from_secs(2),
            command_settle: Duration::from_secs(1),
            poll_tick: Duration::from_secs(1),
            search_depth: 1000,
            unprivileged_marker: '>',
            privileged_marker: '#',
            match_mode: MatchMode::TrailingLine,
            escalate_command: "enable".to_string(),
            paging_command: "terminal length 0".to_string(),
            config_dump_commands: vec!["show run".to_string()],
            delimiter: "!".to_string(),
        }
    }
}

impl SessionSettings {
    /// Set the per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the prompt matching strategy.
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Check that the settings can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if self.timeout.as_secs_f64() > MAX_OVERRIDE_SECS {
            return Err(invalid("timeout must be at most one year"));
        }
        if self.poll_tick.is_zero() {
            return Err(invalid("poll tick must be greater than zero"));
        }
        if self.search_depth == 0 {
            return Err(invalid("search depth must be greater than zero"));
        }
        if self.unprivileged_marker == self.privileged_marker {
            return Err(invalid("unprivileged and privileged markers must differ"));
        }
        if self.escalate_command.trim().is_empty() {
            return Err(invalid("escalate command must not be empty"));
        }
        Ok(())
    }

    /// Load overrides from a JSON file on top of these settings.
    pub fn load_overrides(self, path: &Path) -> Result<Self> {
        let file = SettingsFile::read(path)?;
        let settings = file.apply(self);
        settings.validate()?;
        Ok(settings)
    }
}

fn invalid(message: &str) -> crate::Error {
    ConfigError::Invalid {
        message: message.to_string(),
    }
    .into()
}

/// Longest duration a settings file may set: one year.
const MAX_OVERRIDE_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// JSON overrides for [`SessionSettings`]. Durations are in seconds.
///
/// ```json
/// { "timeout_secs": 30, "paging_command": "terminal pager 0" }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub timeout_secs: Option<f64>,
    pub shell_settle_secs: Option<f64>,
    pub escalation_settle_secs: Option<f64>,
    pub command_settle_secs: Option<f64>,
    pub poll_tick_secs: Option<f64>,
    pub search_depth: Option<usize>,
    pub unprivileged_marker: Option<char>,
    pub privileged_marker: Option<char>,
    pub match_mode: Option<MatchMode>,
    pub escalate_command: Option<String>,
    pub paging_command: Option<String>,
    pub config_dump_commands: Option<Vec<String>>,
    pub delimiter: Option<String>,
}

impl SettingsFile {
    /// Read and parse a settings file.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: PathBuf::from(path),
            source,
        })?;
        Self::parse(&text).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from(path),
                source,
            }
            .into()
        })
    }

    /// Parse settings from JSON text.
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply the overrides that are present.
    pub fn apply(self, mut settings: SessionSettings) -> SessionSettings {
        let secs = |v: f64| Duration::from_secs_f64(v.clamp(0.0, MAX_OVERRIDE_SECS));

        if let Some(v) = self.timeout_secs {
            settings.timeout = secs(v);
        }
        if let Some(v) = self.shell_settle_secs {
            settings.shell_settle = secs(v);
        }
        if let Some(v) = self.escalation_settle_secs {
            settings.escalation_settle = secs(v);
        }
        if let Some(v) = self.command_settle_secs {
            settings.command_settle = secs(v);
        }
        if let Some(v) = self.poll_tick_secs {
            settings.poll_tick = secs(v);
        }
        if let Some(v) = self.search_depth {
            settings.search_depth = v;
        }
        if let Some(v) = self.unprivileged_marker {
            settings.unprivileged_marker = v;
        }
        if let Some(v) = self.privileged_marker {
            settings.privileged_marker = v;
        }
        if let Some(v) = self.match_mode {
            settings.match_mode = v;
        }
        if let Some(v) = self.escalate_command {
            settings.escalate_command = v;
        }
        if let Some(v) = self.paging_command {
            settings.paging_command = v;
        }
        if let Some(v) = self.config_dump_commands {
            settings.config_dump_commands = v;
        }
        if let Some(v) = self.delimiter {
            settings.delimiter = v;
        }
        settings
    }
}
