//! Error types for shellgrab.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::driver::PrivilegeState;

/// Main error type for shellgrab operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session protocol errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Artifact persistence errors
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Server presented a key that differs from known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Server is not in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (shell I/O, pattern compilation).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// I/O error on a stream-backed shell
    #[error("Channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Session protocol errors (privilege handling).
#[derive(Error, Debug)]
pub enum SessionError {
    /// Escalation was already tried once for this host
    #[error("Escalation already attempted for this session")]
    EscalationAlreadyAttempted,

    /// Escalation requested from a state other than unprivileged
    #[error("Escalation requires an unprivileged session, current state is {state}")]
    NotUnprivileged { state: PrivilegeState },

    /// A privileged session observed an unprivileged prompt
    #[error("Privilege level regressed from privileged to {observed}")]
    PrivilegeRegression { observed: PrivilegeState },
}

/// Artifact persistence errors.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Writing an artifact file failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration and input file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An input file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A settings file was not valid JSON for the settings schema
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value was out of range or inconsistent
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Terminal failure of a single host's task.
///
/// Every variant is scoped to one host. The worker pool records it in the
/// run report and keeps going with the other hosts.
#[derive(Error, Debug)]
pub enum HostFailure {
    /// Connecting or opening the interactive shell failed
    #[error("Failed to connect, check DNS/reachability: {0}")]
    Connect(#[source] Error),

    /// No prompt of either kind was seen before the deadline
    #[error("Could not determine privilege level within {0:?}")]
    ClassifyTimeout(Duration),

    /// The session was still not privileged after the single escalation attempt
    #[error("Escalation did not take effect, session is {0}")]
    EscalationIneffective(PrivilegeState),

    /// An artifact could not be written
    #[error("Failed to persist output: {0}")]
    Persistence(#[source] ArtifactError),

    /// The shell or transport failed after the session was established
    #[error("Session lost: {0}")]
    SessionLost(#[source] Error),

    /// The host task panicked and was caught by the worker pool
    #[error("Host task panicked: {0}")]
    TaskPanicked(String),
}

impl HostFailure {
    /// Classify the failure for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            HostFailure::Connect(_) => FailureKind::ConnectFailure,
            HostFailure::ClassifyTimeout(_) => FailureKind::ClassifyTimeout,
            HostFailure::EscalationIneffective(_) => FailureKind::EscalationIneffective,
            HostFailure::Persistence(_) => FailureKind::PersistenceFailure,
            HostFailure::SessionLost(_) => FailureKind::SessionLost,
            HostFailure::TaskPanicked(_) => FailureKind::TaskPanicked,
        }
    }
}

impl From<ArtifactError> for HostFailure {
    fn from(err: ArtifactError) -> Self {
        HostFailure::Persistence(err)
    }
}

/// Serializable failure classification used in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ConnectFailure,
    ClassifyTimeout,
    EscalationIneffective,
    PersistenceFailure,
    SessionLost,
    TaskPanicked,
}

/// Result type alias using shellgrab's Error.
pub type Result<T> = std::result::Result<T, Error>;
