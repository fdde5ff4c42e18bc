//! Channel layer: output accumulation and prompt detection.
//!
//! This module decides when a device's shell has gone idle, based only on
//! the bytes it has sent: ANSI codes are stripped, output accumulates in a
//! [`PatternBuffer`], and [`PromptDetector`] polls the shell until the
//! buffer shows a prompt or the deadline passes.

mod buffer;
mod detector;
mod patterns;

pub use buffer::PatternBuffer;
pub use detector::{Detection, Outcome, PromptDetector};
pub use patterns::{HostPrompt, MatchMode, PromptKind, PromptMatch, PromptPatterns, PromptWatch};
