//! Privilege detection and the single escalation attempt.
//!
//! ```text
//!            classify             escalate + classify
//! ┌─────────┐ ──────► ┌──────────────┐ ──────────► ┌────────────┐
//! │ Unknown │         │ Unprivileged │             │ Privileged │
//! └─────────┘ ──────► └──────────────┘ ──┐         └────────────┘
//!            classify                    │ still unprivileged / no prompt
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │ EscalationFailed │
//!                               └──────────────────┘
//! ```
//!
//! Escalation is attempted at most once per session. A wrong secret and a
//! slow device look the same from here, so there is no retry.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::channel::{Detection, HostPrompt, PromptDetector, PromptKind, PromptWatch};
use crate::config::SessionSettings;
use crate::error::{Result, SessionError};
use crate::logging::Verbosity;
use crate::transport::Shell;

/// Privilege state of one host's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrivilegeState {
    /// Not yet classified, or classification saw no prompt.
    Unknown,
    /// Restricted command set.
    Unprivileged,
    /// Full command set.
    Privileged,
    /// Escalation was attempted and did not take effect.
    EscalationFailed,
}

impl From<PromptKind> for PrivilegeState {
    fn from(kind: PromptKind) -> Self {
        match kind {
            PromptKind::Unprivileged => PrivilegeState::Unprivileged,
            PromptKind::Privileged => PrivilegeState::Privileged,
        }
    }
}

impl fmt::Display for PrivilegeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivilegeState::Unknown => f.write_str("unknown"),
            PrivilegeState::Unprivileged => f.write_str("unprivileged"),
            PrivilegeState::Privileged => f.write_str("privileged"),
            PrivilegeState::EscalationFailed => f.write_str("escalation failed"),
        }
    }
}

/// Drives classification and escalation for one session.
pub struct PrivilegeEscalator<'a> {
    detector: &'a PromptDetector,
    settings: &'a SessionSettings,
    host: &'a str,
    verbosity: Verbosity,
    state: PrivilegeState,
    prompt: Option<HostPrompt>,
    escalation_attempted: bool,
}

impl<'a> PrivilegeEscalator<'a> {
    /// Create an escalator in the `Unknown` state.
    pub fn new(
        detector: &'a PromptDetector,
        settings: &'a SessionSettings,
        host: &'a str,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            detector,
            settings,
            host,
            verbosity,
            state: PrivilegeState::Unknown,
            prompt: None,
            escalation_attempted: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> PrivilegeState {
        self.state
    }

    /// Prompt name captured by the first successful classification.
    pub fn prompt(&self) -> Option<&HostPrompt> {
        self.prompt.as_ref()
    }

    /// Whether escalation has been tried.
    pub fn escalation_attempted(&self) -> bool {
        self.escalation_attempted
    }

    /// Read without sending anything until either prompt kind shows up.
    ///
    /// On timeout the state is left `Unknown` before escalation and becomes
    /// `EscalationFailed` after it; callers treat both as terminal. The
    /// detection is returned so its output is not lost.
    pub async fn classify<S: Shell>(
        &mut self,
        shell: &mut S,
        timeout: std::time::Duration,
    ) -> Result<(PrivilegeState, Detection)> {
        let detection = self
            .detector
            .wait_for(shell, PromptWatch::Either, self.prompt.as_ref(), timeout)
            .await?;

        let observed = detection
            .matched()
            .map_or(PrivilegeState::Unknown, |m| PrivilegeState::from(m.kind));

        if self.prompt.is_none() {
            self.prompt = detection.matched().and_then(|m| m.host_prompt());
        }

        self.state = self.transition(observed)?;
        self.verbosity.progress(
            self.host,
            format_args!("Checking if we are enabled: {}", self.state),
        );
        Ok((self.state, detection))
    }

    fn transition(&self, observed: PrivilegeState) -> Result<PrivilegeState> {
        if self.state == PrivilegeState::Privileged && observed != PrivilegeState::Privileged {
            return Err(SessionError::PrivilegeRegression { observed }.into());
        }
        if self.escalation_attempted && observed != PrivilegeState::Privileged {
            return Ok(PrivilegeState::EscalationFailed);
        }
        if observed == PrivilegeState::Unknown {
            return Ok(self.state);
        }
        Ok(observed)
    }

    /// Send the escalation trigger, then the secret, pausing after each.
    ///
    /// Does not check the result; follow with [`classify`](Self::classify).
    /// Only valid from `Unprivileged`, and only once.
    pub async fn escalate<S: Shell>(&mut self, shell: &mut S, secret: &SecretString) -> Result<()> {
        if self.escalation_attempted {
            return Err(SessionError::EscalationAlreadyAttempted.into());
        }
        if self.state != PrivilegeState::Unprivileged {
            return Err(SessionError::NotUnprivileged { state: self.state }.into());
        }
        self.escalation_attempted = true;

        self.verbosity.progress(self.host, "Entering enable mode...");
        shell.send_line(&self.settings.escalate_command).await?;
        tokio::time::sleep(self.settings.escalation_settle).await;

        log::debug!("[{}] sending <hidden>", self.host);
        shell.send_line(secret.expose_secret()).await?;
        tokio::time::sleep(self.settings.escalation_settle).await;
        Ok(())
    }
}
