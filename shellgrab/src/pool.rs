//! Bounded-concurrency execution of host tasks.
//!
//! Every host gets its own tokio task; a semaphore admits at most
//! `concurrency` of them into their session at a time. The pool waits for
//! all of them, so each submitted host yields exactly one [`HostReport`],
//! including hosts whose task panicked.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::FutureExt;
use log::{debug, error};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::driver::{HostOutcome, HostSummary, PrivilegeState, RunContext};
use crate::error::{FailureKind, HostFailure};
use crate::output::ArtifactSink;
use crate::transport::Connector;

/// Runs host tasks with at most `concurrency` in flight.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    /// Create a pool; a limit of zero is raised to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run one [`HostTask`](crate::driver::HostTask) per host.
    pub async fn run_hosts<C, K>(&self, hosts: &[String], ctx: &RunContext<C, K>) -> RunReport
    where
        C: Connector + 'static,
        K: ArtifactSink + 'static,
    {
        self.run(hosts, |host| ctx.host_task(host).run()).await
    }

    /// Run `task` for every host and collect the outcomes in host order.
    pub async fn run<F, Fut>(&self, hosts: &[String], task: F) -> RunReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = HostOutcome> + Send + 'static,
    {
        let started_at = Local::now();
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, host) in hosts.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let session = task(host.clone());
            let host = host.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                debug!("[{}] admitted", host);
                let started = Instant::now();
                let report = match AssertUnwindSafe(session).catch_unwind().await {
                    Ok(outcome) => HostReport::from_outcome(outcome),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("[{}] host task panicked: {}", host, message);
                        HostReport::from_failure(
                            host,
                            PrivilegeState::Unknown,
                            &HostFailure::TaskPanicked(message),
                            started.elapsed(),
                        )
                    }
                };
                (index, report)
            });
        }

        let mut slots: Vec<Option<HostReport>> = hosts.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!("host task did not complete: {}", e),
            }
        }

        let entries = slots
            .into_iter()
            .zip(hosts)
            .map(|(slot, host)| {
                slot.unwrap_or_else(|| {
                    HostReport::from_failure(
                        host.clone(),
                        PrivilegeState::Unknown,
                        &HostFailure::TaskPanicked("task aborted".to_string()),
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        RunReport {
            started_at,
            elapsed_ms: duration_ms(start.elapsed()),
            entries,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Per-host status in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Succeeded,
    Failed,
}

/// One host's line in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub privilege: PrivilegeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<HostSummary>,
    pub elapsed_ms: u64,
}

impl HostReport {
    /// Convert a finished task's outcome.
    pub fn from_outcome(outcome: HostOutcome) -> Self {
        match outcome.result {
            Ok(summary) => Self {
                host: outcome.host,
                status: HostStatus::Succeeded,
                failure: None,
                detail: None,
                privilege: outcome.privilege,
                summary: Some(summary),
                elapsed_ms: duration_ms(outcome.elapsed),
            },
            Err(failure) => Self::from_failure(outcome.host, outcome.privilege, &failure, outcome.elapsed),
        }
    }

    fn from_failure(host: String, privilege: PrivilegeState, failure: &HostFailure, elapsed: Duration) -> Self {
        Self {
            host,
            status: HostStatus::Failed,
            failure: Some(failure.kind()),
            detail: Some(failure.to_string()),
            privilege,
            summary: None,
            elapsed_ms: duration_ms(elapsed),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HostStatus::Succeeded
    }
}

impl fmt::Display for HostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.summary) {
            (HostStatus::Succeeded, Some(s)) => write!(
                f,
                "{:<24} ok      {} commands ({} timed out), {} config(s), {} transcript entries",
                self.host,
                s.commands_completed + s.commands_timed_out,
                s.commands_timed_out,
                s.configs_written,
                s.transcript_entries
            ),
            (HostStatus::Succeeded, None) => write!(f, "{:<24} ok", self.host),
            (HostStatus::Failed, _) => write!(
                f,
                "{:<24} FAILED  {:?}: {}",
                self.host,
                self.failure.unwrap_or(FailureKind::TaskPanicked),
                self.detail.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Outcome of a whole run, one entry per submitted host in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub elapsed_ms: u64,
    pub entries: Vec<HostReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &HostReport> {
        self.entries.iter().filter(|e| e.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &HostReport> {
        self.entries.iter().filter(|e| !e.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(HostReport::is_success)
    }

    /// Find the entry for `host`.
    pub fn entry(&self, host: &str) -> Option<&HostReport> {
        self.entries.iter().find(|e| e.host == host)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        write!(
            f,
            "{} host(s): {} succeeded, {} failed in {:.1}s",
            self.entries.len(),
            self.succeeded().count(),
            self.failed().count(),
            self.elapsed_ms as f64 / 1000.0
        )
    }
}
