//! Session protocol for one device.
//!
//! The driver layer turns an open [`Shell`](crate::transport::Shell) into
//! captured output: [`PrivilegeEscalator`] establishes privileged mode,
//! [`CommandSequencer`] runs the command list, and [`HostTask`] strings the
//! steps together with connect and cleanup.

mod host;
mod privilege;
mod response;
mod sequencer;

pub use host::{Host, HostOutcome, HostSummary, HostTask, RunContext};
pub use privilege::{PrivilegeEscalator, PrivilegeState};
pub use response::{CommandResult, Completion};
pub use sequencer::CommandSequencer;
