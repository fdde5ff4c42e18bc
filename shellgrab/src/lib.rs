//! # Shellgrab
//!
//! Concurrent SSH CLI scraper for network devices.
//!
//! Shellgrab logs into many devices in parallel, raises each session to
//! privileged mode, turns off paging, runs a list of commands and saves what
//! comes back: configuration dumps to one file per host, everything else to
//! a per-host session transcript. A host that fails is recorded and never
//! holds up the others.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, bounded by a worker pool
//! - Prompt detection on the trailing line, pinned to the device's own prompt
//! - Single, fail-closed privilege escalation
//! - Per-command deadlines that degrade instead of aborting the host
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use secrecy::SecretString;
//! use shellgrab::driver::RunContext;
//! use shellgrab::inventory::parse_command_list;
//! use shellgrab::output::FsSink;
//! use shellgrab::transport::{AuthMethod, SshConfig, SshConnector};
//! use shellgrab::{SessionSettings, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shellgrab::Error> {
//!     let ssh = SshConfig::new("admin", AuthMethod::Password(SecretString::from("secret")));
//!     let sink = Arc::new(FsSink::new("configs", "logs"));
//!     sink.prepare().await?;
//!
//!     let ctx = RunContext::new(
//!         SshConnector::new(ssh),
//!         sink,
//!         parse_command_list("show run\nshow version\n"),
//!         SessionSettings::default(),
//!         SecretString::from("enable-secret"),
//!     )?;
//!
//!     let hosts = vec!["192.168.1.1".to_string(), "192.168.1.2".to_string()];
//!     let report = WorkerPool::new(8).run_hosts(&hosts, &ctx).await;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod output;
pub mod pool;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::SessionSettings;
pub use driver::{CommandResult, HostTask, PrivilegeState, RunContext};
pub use error::{Error, HostFailure, Result};
pub use logging::Verbosity;
pub use pool::{RunReport, WorkerPool};
pub use transport::{AuthMethod, SshConfig};
