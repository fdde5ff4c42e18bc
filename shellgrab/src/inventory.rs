//! Host and command list inputs.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use log::warn;

use crate::error::{ConfigError, Result};

/// One literal command line from the operator's command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    line: String,
}

impl CommandSpec {
    /// Wrap a command line. A trailing carriage return is dropped.
    pub fn new(line: impl Into<String>) -> Self {
        let mut line = line.into();
        if line.ends_with('\r') {
            line.pop();
        }
        Self { line }
    }

    /// The command text as it will be sent.
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Whether this line is a no-op: blank, or only the delimiter marker.
    pub fn is_noop(&self, delimiter: &str) -> bool {
        let trimmed = self.line.trim();
        trimmed.is_empty() || (!delimiter.is_empty() && trimmed == delimiter)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl From<&str> for CommandSpec {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

/// Parse a command list: one command per line, every line kept in order.
///
/// No-op lines are kept here and skipped by the sequencer.
pub fn parse_command_list(text: &str) -> Vec<CommandSpec> {
    text.lines().map(CommandSpec::new).collect()
}

/// Parse a host list: one host per line.
///
/// Whitespace is trimmed, blank lines and `#` comments are skipped, and
/// repeated hosts are dropped so each host is processed once.
pub fn parse_host_list(text: &str) -> Vec<String> {
    let mut hosts = IndexSet::new();
    for line in text.lines() {
        let host = line.trim();
        if host.is_empty() || host.starts_with('#') {
            continue;
        }
        if !hosts.insert(host.to_string()) {
            warn!("Skipping duplicate host '{}'", host);
        }
    }
    hosts.into_iter().collect()
}

/// Read and parse a host list file.
pub fn read_host_list(path: &Path) -> Result<Vec<String>> {
    let hosts = parse_host_list(&read(path)?);
    if hosts.is_empty() {
        return Err(ConfigError::Invalid {
            message: format!("no hosts listed in {}", path.display()),
        }
        .into());
    }
    Ok(hosts)
}

/// Read and parse a command list file.
pub fn read_command_list(path: &Path) -> Result<Vec<CommandSpec>> {
    Ok(parse_command_list(&read(path)?))
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| {
        ConfigError::Read {
            path: PathBuf::from(path),
            source,
        }
        .into()
    })
}
