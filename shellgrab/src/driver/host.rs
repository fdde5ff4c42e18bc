//! End-to-end session for a single host.
//!
//! A [`HostTask`] connects, classifies the prompt, escalates once if needed,
//! runs the command list and persists every result. Whatever happens, the
//! shell is closed before the task reports, and any terminal failure is
//! returned as a [`HostFailure`] rather than propagated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, warn};
use secrecy::SecretString;
use serde::Serialize;
use tokio::time::Instant;

use super::privilege::{PrivilegeEscalator, PrivilegeState};
use super::response::Completion;
use super::sequencer::CommandSequencer;
use crate::channel::PromptDetector;
use crate::config::SessionSettings;
use crate::error::{HostFailure, Result};
use crate::inventory::CommandSpec;
use crate::logging::Verbosity;
use crate::output::{ArtifactKind, ArtifactSink, ErrorLog, OutputRouter};
use crate::transport::{Connector, Shell};

/// Run-scoped state of one host. Owned by its task.
#[derive(Debug, Clone)]
pub struct Host {
    /// Host name or address as given in the host list.
    pub name: String,

    /// Last classified privilege level.
    pub privilege: PrivilegeState,

    /// When the session started; names the transcript. Set by [`HostTask::run`].
    pub session_start: DateTime<Local>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege: PrivilegeState::Unknown,
            session_start: Local::now(),
        }
    }
}

/// What a successful host session did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    /// Commands whose prompt came back in time.
    pub commands_completed: usize,

    /// Commands that hit the deadline; their partial output was still kept.
    pub commands_timed_out: usize,

    /// Config artifacts written.
    pub configs_written: usize,

    /// Transcript entries appended.
    pub transcript_entries: usize,
}

/// Final result of one host task.
#[derive(Debug)]
pub struct HostOutcome {
    pub host: String,
    pub privilege: PrivilegeState,
    pub result: std::result::Result<HostSummary, HostFailure>,
    pub elapsed: Duration,
}

impl HostOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a host task needs, shared read-only across tasks.
pub struct RunContext<C, K> {
    connector: Arc<C>,
    sink: Arc<K>,
    error_log: Option<Arc<ErrorLog>>,
    commands: Arc<[CommandSpec]>,
    settings: Arc<SessionSettings>,
    detector: Arc<PromptDetector>,
    router: Arc<OutputRouter>,
    enable_secret: Arc<SecretString>,
    verbosity: Verbosity,
}

impl<C, K> Clone for RunContext<C, K> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            sink: Arc::clone(&self.sink),
            error_log: self.error_log.clone(),
            commands: Arc::clone(&self.commands),
            settings: Arc::clone(&self.settings),
            detector: Arc::clone(&self.detector),
            router: Arc::clone(&self.router),
            enable_secret: Arc::clone(&self.enable_secret),
            verbosity: self.verbosity,
        }
    }
}

impl<C: Connector, K: ArtifactSink> RunContext<C, K> {
    /// Build a context. Fails if the settings' prompt markers do not compile.
    pub fn new(
        connector: C,
        sink: Arc<K>,
        commands: Vec<CommandSpec>,
        settings: SessionSettings,
        enable_secret: SecretString,
    ) -> Result<Self> {
        let detector = PromptDetector::from_settings(&settings)?;
        let router = OutputRouter::from_settings(&settings);
        Ok(Self {
            connector: Arc::new(connector),
            sink,
            error_log: None,
            commands: commands.into(),
            settings: Arc::new(settings),
            detector: Arc::new(detector),
            router: Arc::new(router),
            enable_secret: Arc::new(enable_secret),
            verbosity: Verbosity::default(),
        })
    }

    /// Record host failures in `log`.
    pub fn with_error_log(mut self, log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(log);
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Create the task for one host.
    pub fn host_task(&self, host: impl Into<String>) -> HostTask<C, K> {
        HostTask {
            ctx: self.clone(),
            host: Host::new(host),
        }
    }
}

/// One host's complete session.
pub struct HostTask<C, K> {
    ctx: RunContext<C, K>,
    host: Host,
}

impl<C: Connector, K: ArtifactSink> HostTask<C, K> {
    /// Run the session to completion.
    pub async fn run(self) -> HostOutcome {
        let HostTask { ctx, mut host } = self;
        let start = Instant::now();
        host.session_start = Local::now();
        ctx.verbosity.progress(&host.name, "Working on host");

        let result = match ctx.connector.connect(&host.name).await {
            Err(e) => Err(HostFailure::Connect(e)),
            Ok(mut shell) => {
                ctx.verbosity.progress(&host.name, "Connected");
                let result = session(&ctx, &mut host, &mut shell).await;
                if let Err(e) = shell.close().await {
                    debug!("[{}] error closing shell: {}", host.name, e);
                }
                result
            }
        };

        if let Err(failure) = &result {
            warn!("[{}] {}", host.name, failure);
            if let Some(log) = &ctx.error_log {
                if let Err(e) = log.append(&host.name, failure).await {
                    warn!("[{}] could not record failure: {}", host.name, e);
                }
            }
        } else {
            ctx.verbosity.progress(&host.name, "Done");
        }

        HostOutcome {
            host: host.name,
            privilege: host.privilege,
            result,
            elapsed: start.elapsed(),
        }
    }
}

async fn session<C, K, S>(
    ctx: &RunContext<C, K>,
    host: &mut Host,
    shell: &mut S,
) -> std::result::Result<HostSummary, HostFailure>
where
    C: Connector,
    K: ArtifactSink,
    S: Shell,
{
    let settings = &*ctx.settings;
    tokio::time::sleep(settings.shell_settle).await;

    let mut escalator = PrivilegeEscalator::new(&ctx.detector, settings, &host.name, ctx.verbosity);
    let (state, _) = escalator
        .classify(shell, settings.timeout)
        .await
        .map_err(HostFailure::SessionLost)?;
    host.privilege = state;

    match state {
        PrivilegeState::Privileged => {}
        PrivilegeState::Unknown => return Err(HostFailure::ClassifyTimeout(settings.timeout)),
        PrivilegeState::Unprivileged => {
            escalator
                .escalate(shell, &ctx.enable_secret)
                .await
                .map_err(HostFailure::SessionLost)?;
            let (state, _) = escalator
                .classify(shell, settings.timeout)
                .await
                .map_err(HostFailure::SessionLost)?;
            host.privilege = state;
            if state != PrivilegeState::Privileged {
                return Err(HostFailure::EscalationIneffective(state));
            }
        }
        PrivilegeState::EscalationFailed => return Err(HostFailure::EscalationIneffective(state)),
    }

    let prompt = escalator.prompt().cloned();
    let mut sequencer = CommandSequencer::new(
        shell,
        &ctx.detector,
        &ctx.router,
        settings,
        prompt,
        &ctx.commands,
        &host.name,
        ctx.verbosity,
    );

    let mut summary = HostSummary::default();
    while let Some(result) = sequencer
        .next_result()
        .await
        .map_err(HostFailure::SessionLost)?
    {
        match result.completion {
            Completion::Completed => summary.commands_completed += 1,
            Completion::TimedOut => summary.commands_timed_out += 1,
        }

        let artifact = ctx.router.route(&host.name, &host.session_start, &result);
        ctx.sink.persist(&artifact).await?;
        match artifact.key.kind {
            ArtifactKind::Config => summary.configs_written += 1,
            ArtifactKind::Transcript => summary.transcript_entries += 1,
        }
    }

    Ok(summary)
}
