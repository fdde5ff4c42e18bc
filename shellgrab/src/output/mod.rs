//! Output routing and persistence.
//!
//! [`OutputRouter`] decides where each command's output goes; an
//! [`ArtifactSink`] writes it. Host-level failures go to the shared
//! [`ErrorLog`].

mod error_log;
mod router;
mod sink;

pub use error_log::ErrorLog;
pub use router::{Artifact, ArtifactKey, ArtifactKind, OutputRouter, WriteMode, timestamp, transcript_header};
pub use sink::{ArtifactSink, FsSink, MemorySink};
