//! Deadline-bounded waiting for a prompt.

use std::time::Duration;

use log::trace;
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::patterns::{HostPrompt, MatchMode, PromptMatch, PromptPatterns, PromptWatch};
use crate::config::SessionSettings;
use crate::error::{ChannelError, Result};
use crate::transport::Shell;

/// How a prompt wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A watched prompt was recognised.
    Matched(PromptMatch),

    /// The deadline passed first.
    TimedOut,
}

/// Result of a prompt wait. Output is kept on timeout too.
#[derive(Debug, Clone)]
pub struct Detection {
    /// How the wait ended.
    pub outcome: Outcome,

    /// Everything received during the wait, ANSI codes stripped.
    pub output: String,

    /// Time spent waiting.
    pub elapsed: Duration,
}

impl Detection {
    /// The matched prompt, if any.
    pub fn matched(&self) -> Option<&PromptMatch> {
        match &self.outcome {
            Outcome::Matched(m) => Some(m),
            Outcome::TimedOut => None,
        }
    }

    /// Whether the deadline passed before a prompt appeared.
    pub fn timed_out(&self) -> bool {
        self.outcome == Outcome::TimedOut
    }
}

/// Polls a shell until its output shows a prompt.
///
/// Reads wait at most one poll tick before the deadline is re-checked, so
/// no wait runs past its deadline by more than one tick.
#[derive(Debug, Clone)]
pub struct PromptDetector {
    patterns: PromptPatterns,
    mode: MatchMode,
    poll_tick: Duration,
    search_depth: usize,
}

impl PromptDetector {
    /// Create a detector.
    pub fn new(patterns: PromptPatterns, mode: MatchMode, poll_tick: Duration, search_depth: usize) -> Self {
        Self {
            patterns,
            mode,
            poll_tick,
            search_depth,
        }
    }

    /// Build a detector from session settings.
    pub fn from_settings(settings: &SessionSettings) -> Result<Self> {
        let patterns = PromptPatterns::new(settings.unprivileged_marker, settings.privileged_marker)
            .map_err(ChannelError::InvalidPattern)?;
        Ok(Self::new(
            patterns,
            settings.match_mode,
            settings.poll_tick,
            settings.search_depth,
        ))
    }

    /// The prompt patterns in use.
    pub fn patterns(&self) -> &PromptPatterns {
        &self.patterns
    }

    /// The matching strategy in use.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Read from `shell` until a watched prompt appears or `timeout` elapses.
    ///
    /// Channel errors (closed shell, I/O failure) are returned as errors; an
    /// elapsed deadline is not an error.
    pub async fn wait_for<S: Shell>(
        &self,
        shell: &mut S,
        watch: PromptWatch,
        pinned: Option<&HostPrompt>,
        timeout: Duration,
    ) -> Result<Detection> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut buffer = PatternBuffer::new(self.search_depth);

        let outcome = loop {
            let now = Instant::now();
            if now >= deadline {
                break Outcome::TimedOut;
            }

            let wait = self.poll_tick.min(deadline - now);
            if let Some(chunk) = shell.recv(wait).await? {
                buffer.extend(&chunk);
                trace!("received {} bytes, buffer {} bytes", chunk.len(), buffer.len());

                if let Some(found) = self.patterns.find(&buffer, watch, self.mode, pinned) {
                    break Outcome::Matched(found);
                }
            }
        };

        Ok(Detection {
            outcome,
            output: buffer.as_str_lossy().into_owned(),
            elapsed: start.elapsed(),
        })
    }
}

impl Default for PromptDetector {
    fn default() -> Self {
        Self::new(PromptPatterns::default(), MatchMode::default(), Duration::from_secs(1), 1000)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::channel::PromptKind;
    use crate::transport::StreamShell;

    #[tokio::test(start_paused = true)]
    async fn test_matches_prompt_across_chunks() {
        let (client, mut device) = tokio::io::duplex(4096);
        let mut shell = StreamShell::new(client);
        let detector = PromptDetector::default();

        tokio::spawn(async move {
            device.write_all(b"banner\r\nrout").await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            device.write_all(b"er1>").await.unwrap();
            // keep the stream open
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let detection = detector
            .wait_for(&mut shell, PromptWatch::Either, None, Duration::from_secs(5))
            .await
            .unwrap();

        let m = detection.matched().unwrap();
        assert_eq!(m.kind, PromptKind::Unprivileged);
        assert_eq!(m.name.as_deref(), Some("router1"));
        // compare without carriage returns
        assert_eq!(detection.output.replace('\r', ""), "banner\nrouter1>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_partial_output() {
        let (client, mut device) = tokio::io::duplex(4096);
        let mut shell = StreamShell::new(client);
        let detector = PromptDetector::default();

        device.write_all(b"partial output, no prompt").await.unwrap();

        let detection = detector
            .wait_for(&mut shell, PromptWatch::Privileged, None, Duration::from_secs(3))
            .await
            .unwrap();

        assert!(detection.timed_out());
        assert_eq!(detection.output, "partial output, no prompt");
        assert!(detection.elapsed >= Duration::from_secs(3));
        assert!(detection.elapsed < Duration::from_secs(5));
        drop(device);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_is_error() {
        let (client, device) = tokio::io::duplex(4096);
        let mut shell = StreamShell::new(client);
        drop(device);

        let result = PromptDetector::default()
            .wait_for(&mut shell, PromptWatch::Either, None, Duration::from_secs(3))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_wait_skips_foreign_prompt() {
        let (client, mut device) = tokio::io::duplex(4096);
        let mut shell = StreamShell::new(client);
        let host = HostPrompt::new("router1");

        device.write_all(b"Last login from jump#\r\nrouter1#").await.unwrap();

        let detection = PromptDetector::default()
            .wait_for(&mut shell, PromptWatch::Privileged, Some(&host), Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(detection.matched().unwrap().line, "router1#");
        drop(device);
    }
}
