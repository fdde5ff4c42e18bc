//! Ordered command execution on a privileged shell.
//!
//! [`CommandSequencer`] yields one [`CommandResult`] per command, produced
//! lazily as the caller asks for the next one. Paging is switched off once
//! before the first command. A command whose prompt never returns is logged
//! and reported as [`Completion::TimedOut`](super::Completion::TimedOut);
//! the sequence carries on with the next command.

use std::slice;

use futures_util::Stream;
use log::{debug, warn};
use tokio::time::Instant;

use super::response::CommandResult;
use crate::channel::{HostPrompt, PromptDetector, PromptWatch};
use crate::config::SessionSettings;
use crate::error::Result;
use crate::inventory::CommandSpec;
use crate::logging::Verbosity;
use crate::output::OutputRouter;
use crate::transport::Shell;

/// Lazy, single-use sequence of command executions on one shell.
pub struct CommandSequencer<'a, S: Shell> {
    shell: &'a mut S,
    detector: &'a PromptDetector,
    router: &'a OutputRouter,
    settings: &'a SessionSettings,
    prompt: Option<HostPrompt>,
    commands: slice::Iter<'a, CommandSpec>,
    host: &'a str,
    verbosity: Verbosity,
    paging_disabled: bool,
}

impl<'a, S: Shell> CommandSequencer<'a, S> {
    /// Create a sequencer over `commands`.
    ///
    /// The shell must already be at the privileged prompt. `prompt` is the
    /// host prompt captured during classification, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shell: &'a mut S,
        detector: &'a PromptDetector,
        router: &'a OutputRouter,
        settings: &'a SessionSettings,
        prompt: Option<HostPrompt>,
        commands: &'a [CommandSpec],
        host: &'a str,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            shell,
            detector,
            router,
            settings,
            prompt,
            commands: commands.iter(),
            host,
            verbosity,
            paging_disabled: false,
        }
    }

    /// Execute the next non-empty command.
    ///
    /// Returns `Ok(None)` once the list is exhausted. Errors mean the shell
    /// itself failed and the sequence cannot continue.
    pub async fn next_result(&mut self) -> Result<Option<CommandResult>> {
        if !self.paging_disabled {
            self.disable_paging().await?;
        }

        for command in self.commands.by_ref() {
            if command.is_noop(&self.settings.delimiter) {
                debug!("[{}] skipping empty command line", self.host);
                continue;
            }
            return self.execute(command).await.map(Some);
        }
        Ok(None)
    }

    /// Turn the sequencer into a stream of results.
    pub fn into_stream(self) -> impl Stream<Item = Result<CommandResult>> + 'a {
        futures_util::stream::try_unfold(self, |mut sequencer| async move {
            let next = sequencer.next_result().await?;
            Ok::<_, crate::Error>(next.map(|result| (result, sequencer)))
        })
    }

    async fn disable_paging(&mut self) -> Result<()> {
        self.paging_disabled = true;
        self.verbosity.progress(self.host, "Disabling paging");

        self.shell.send_line(&self.settings.paging_command).await?;
        tokio::time::sleep(self.settings.command_settle).await;

        let detection = self
            .detector
            .wait_for(
                self.shell,
                PromptWatch::Privileged,
                self.prompt.as_ref(),
                self.settings.timeout,
            )
            .await?;
        if detection.timed_out() {
            warn!(
                "[{}] no prompt after '{}' within {:?}, continuing",
                self.host, self.settings.paging_command, self.settings.timeout
            );
        }
        Ok(())
    }

    async fn execute(&mut self, command: &CommandSpec) -> Result<CommandResult> {
        self.verbosity
            .progress(self.host, format_args!("Sending command: {command}"));

        let start = Instant::now();
        self.shell.send_line(command.as_str()).await?;
        tokio::time::sleep(self.settings.command_settle).await;

        let detection = self
            .detector
            .wait_for(
                self.shell,
                PromptWatch::Privileged,
                self.prompt.as_ref(),
                self.settings.timeout,
            )
            .await?;

        if detection.timed_out() {
            warn!(
                "[{}] '{}' did not return to the prompt within {:?}, keeping {} bytes of partial output",
                self.host,
                command,
                self.settings.timeout,
                detection.output.len()
            );
        }

        Ok(CommandResult::from_detection(
            command.clone(),
            detection,
            start.elapsed(),
            self.router.classify(command),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{TryStreamExt, pin_mut};
    use tokio::io::DuplexStream;

    use super::*;
    use crate::channel::MatchMode;
    use crate::driver::Completion;
    use crate::inventory::parse_command_list;
    use crate::output::ArtifactKind;
    use crate::testing::FakeDevice;
    use crate::transport::StreamShell;

    struct Fixture {
        detector: PromptDetector,
        router: OutputRouter,
        settings: SessionSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = SessionSettings::default();
            Self {
                detector: PromptDetector::from_settings(&settings).unwrap(),
                router: OutputRouter::from_settings(&settings),
                settings,
            }
        }
    }

    /// Spawn the device and consume its login banner.
    async fn ready(device: FakeDevice) -> StreamShell<DuplexStream> {
        let mut shell = device.spawn();
        let banner = PromptDetector::default()
            .wait_for(&mut shell, PromptWatch::Either, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(banner.matched().is_some());
        shell
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_result_per_command_in_order() {
        let device = FakeDevice::new("r1")
            .privileged()
            .respond("show version", "IOS 15.2\r\n")
            .respond("show clock", "12:00:00 UTC\r\n");
        let received = device.received();
        let mut shell = ready(device).await;

        let fx = Fixture::new();
        let commands = parse_command_list("show version\n\n!\nshow clock\n  \nshow version\n");
        let mut sequencer = CommandSequencer::new(
            &mut shell,
            &fx.detector,
            &fx.router,
            &fx.settings,
            Some(HostPrompt::new("r1")),
            &commands,
            "r1",
            Verbosity::quiet(),
        );

        let mut seen = Vec::new();
        while let Some(result) = sequencer.next_result().await.unwrap() {
            assert!(result.is_complete());
            seen.push(result.command.to_string());
        }
        assert_eq!(seen, ["show version", "show clock", "show version"]);
        assert!(sequencer.next_result().await.unwrap().is_none());

        let sent = received.lock().unwrap().clone();
        assert_eq!(
            sent,
            ["terminal length 0", "show version", "show clock", "show version"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_stop_sequence() {
        let device = FakeDevice::new("r1")
            .privileged()
            .silent("show tech", "partial tech output\r\n")
            .respond("show version", "IOS 15.2\r\n");
        let mut shell = ready(device).await;

        let fx = Fixture::new();
        let commands = parse_command_list("show tech\nshow version");
        let sequencer = CommandSequencer::new(
            &mut shell,
            &fx.detector,
            &fx.router,
            &fx.settings,
            Some(HostPrompt::new("r1")),
            &commands,
            "r1",
            Verbosity::quiet(),
        );
        let stream = sequencer.into_stream();
        pin_mut!(stream);

        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.completion, Completion::TimedOut);
        assert!(first.output.contains("partial tech output"));
        assert!(first.elapsed >= fx.settings.timeout);

        let second = stream.try_next().await.unwrap().unwrap();
        assert_eq!(second.completion, Completion::Completed);
        assert!(second.output.contains("IOS 15.2"));

        assert!(stream.try_next().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_follows_command_text() {
        let device = FakeDevice::new("r1")
            .privileged()
            .respond("show version", "IOS 15.2\r\n")
            .respond("show running-config", "hostname r1\r\n!\r\nend\r\n");
        let mut shell = ready(device).await;

        let fx = Fixture::new();
        let commands = parse_command_list("show version\nshow running-config");
        let results: Vec<CommandResult> = CommandSequencer::new(
            &mut shell,
            &fx.detector,
            &fx.router,
            &fx.settings,
            None,
            &commands,
            "r1",
            Verbosity::quiet(),
        )
        .into_stream()
        .try_collect()
        .await
        .unwrap();

        let kinds: Vec<ArtifactKind> = results.iter().map(|r| r.destination).collect();
        assert_eq!(kinds, [ArtifactKind::Transcript, ArtifactKind::Config]);
        assert!(results[1].output.contains("hostname r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_shell_is_error() {
        let device = FakeDevice::new("r1").privileged().hang_up_after("show version");
        let mut shell = ready(device).await;

        let fx = Fixture::new();
        let commands = parse_command_list("show version\nshow clock");
        let mut sequencer = CommandSequencer::new(
            &mut shell,
            &fx.detector,
            &fx.router,
            &fx.settings,
            None,
            &commands,
            "r1",
            Verbosity::quiet(),
        );

        assert!(sequencer.next_result().await.is_err());
    }

    fn stalled_dump() -> FakeDevice {
        FakeDevice::new("r1")
            .privileged()
            .stall(
                "show run",
                "hostname r1\r\ninterface Gi0/1\r\n description # uplink\r\n",
                "end\r\n",
            )
            .respond("show version", "IOS 15.2\r\n")
    }

    #[tokio::test(start_paused = true)]
    async fn test_anywhere_mode_ends_capture_at_first_marker() {
        let mut shell = ready(stalled_dump()).await;

        let settings = SessionSettings::default().with_match_mode(MatchMode::Anywhere);
        let detector = PromptDetector::from_settings(&settings).unwrap();
        let router = OutputRouter::from_settings(&settings);
        let commands = parse_command_list("show run\nshow version");
        let results: Vec<CommandResult> = CommandSequencer::new(
            &mut shell,
            &detector,
            &router,
            &settings,
            None,
            &commands,
            "r1",
            Verbosity::quiet(),
        )
        .into_stream()
        .try_collect()
        .await
        .unwrap();

        // cut at the '#' in the description, yet reported complete
        assert!(results[0].is_complete());
        assert!(results[0].output.contains("# uplink"));
        assert!(!results[0].output.contains("end"));
        // the remainder lands in the next command's output
        assert!(results[1].output.contains("end"));
        assert!(!results[1].output.contains("IOS 15.2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_line_mode_waits_past_marker_in_output() {
        let mut shell = ready(stalled_dump()).await;

        let fx = Fixture::new();
        let commands = parse_command_list("show run\nshow version");
        let results: Vec<CommandResult> = CommandSequencer::new(
            &mut shell,
            &fx.detector,
            &fx.router,
            &fx.settings,
            Some(HostPrompt::new("r1")),
            &commands,
            "r1",
            Verbosity::quiet(),
        )
        .into_stream()
        .try_collect()
        .await
        .unwrap();

        assert!(results[0].is_complete());
        assert!(results[0].output.contains("# uplink"));
        assert!(results[0].output.contains("end"));
        assert!(results[0].elapsed >= crate::testing::STALL);
        assert!(results[1].output.contains("IOS 15.2"));
    }
}
