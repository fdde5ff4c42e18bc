//! Simulated devices for session tests.
//!
//! [`FakeDevice`] speaks a minimal Cisco-style CLI over an in-memory duplex
//! stream: it echoes each line, answers known commands and ends every reply
//! with its prompt. [`FakeConnector`] hands out one device per host name.
//! [`RejectingSink`] fails every write for one host.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::Notify;

use crate::error::{ArtifactError, Result, TransportError};
use crate::output::{Artifact, ArtifactSink, MemorySink};
use crate::transport::{Connector, StreamShell};

const BANNER: &str = "\r\n\r\nUser Access Verification\r\n\r\n";

/// Pause inside a stalled reply.
pub(crate) const STALL: Duration = Duration::from_secs(3);

/// Scripted CLI peer.
#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    hostname: String,
    privileged: bool,
    enable_secret: String,
    responses: HashMap<String, String>,
    silent: HashMap<String, String>,
    stalled: HashMap<String, (String, String)>,
    hang_up: HashSet<String>,
    mute: bool,
    received: Arc<Mutex<Vec<String>>>,
    closed: Arc<Notify>,
}

impl FakeDevice {
    /// An unprivileged device whose enable secret is `enable-pw`.
    pub(crate) fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            privileged: false,
            enable_secret: "enable-pw".to_string(),
            responses: HashMap::new(),
            silent: HashMap::new(),
            stalled: HashMap::new(),
            hang_up: HashSet::new(),
            mute: false,
            received: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Notify::new()),
        }
    }

    /// Start at the privileged prompt.
    pub(crate) fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub(crate) fn enable_secret(mut self, secret: &str) -> Self {
        self.enable_secret = secret.to_string();
        self
    }

    /// Answer `command` with `output` followed by the prompt.
    pub(crate) fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses.insert(command.to_string(), output.to_string());
        self
    }

    /// Answer `command` with `partial` and never show the prompt.
    pub(crate) fn silent(mut self, command: &str, partial: &str) -> Self {
        self.silent.insert(command.to_string(), partial.to_string());
        self
    }

    /// Answer `command` with `head`, pause for [`STALL`], then send `tail` and the prompt.
    pub(crate) fn stall(mut self, command: &str, head: &str, tail: &str) -> Self {
        self.stalled
            .insert(command.to_string(), (head.to_string(), tail.to_string()));
        self
    }

    /// Never show a prompt.
    pub(crate) fn mute(mut self) -> Self {
        self.mute = true;
        self
    }

    /// Drop the connection when `command` arrives.
    pub(crate) fn hang_up_after(mut self, command: &str) -> Self {
        self.hang_up.insert(command.to_string());
        self
    }

    /// Every line the device has read, in order.
    pub(crate) fn received(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.received)
    }

    /// Notified once the client closes its end.
    pub(crate) fn closed(&self) -> Arc<Notify> {
        Arc::clone(&self.closed)
    }

    /// Run the device on a background task and return the client side.
    pub(crate) fn spawn(self) -> StreamShell<DuplexStream> {
        let (client, device) = tokio::io::duplex(64 * 1024);
        tokio::spawn(self.serve(device));
        StreamShell::new(client)
    }

    fn prompt(&self) -> String {
        if self.mute {
            return String::new();
        }
        let marker = if self.privileged { '#' } else { '>' };
        format!("{}{}", self.hostname, marker)
    }

    async fn serve(mut self, stream: DuplexStream) {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        let greeting = format!("{BANNER}{}", self.prompt());
        if writer.write_all(greeting.as_bytes()).await.is_err() {
            return;
        }

        let mut awaiting_secret = false;
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut received) = self.received.lock() {
                received.push(line.clone());
            }
            if self.hang_up.contains(&line) {
                return;
            }

            let reply = if awaiting_secret {
                awaiting_secret = false;
                if line == self.enable_secret {
                    self.privileged = true;
                    format!("\r\n{}", self.prompt())
                } else {
                    format!("\r\n% Access denied\r\n\r\n{}", self.prompt())
                }
            } else if line == "enable" {
                if self.privileged {
                    format!("{line}\r\n{}", self.prompt())
                } else {
                    awaiting_secret = true;
                    format!("{line}\r\nPassword: ")
                }
            } else if line.is_empty() || line == "terminal length 0" {
                format!("{line}\r\n{}", self.prompt())
            } else if let Some(partial) = self.silent.get(&line) {
                format!("{line}\r\n{partial}")
            } else if let Some((head, tail)) = self.stalled.get(&line) {
                let head = format!("{line}\r\n{head}");
                if writer.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                tokio::time::sleep(STALL).await;
                format!("{tail}{}", self.prompt())
            } else if let Some(output) = self.responses.get(&line) {
                format!("{line}\r\n{output}{}", self.prompt())
            } else {
                format!(
                    "{line}\r\n              ^\r\n% Invalid input detected at '^' marker.\r\n\r\n{}",
                    self.prompt()
                )
            };

            if writer.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
        self.closed.notify_one();
    }
}

/// Connector that serves [`FakeDevice`]s; unknown hosts refuse the connection.
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    devices: Mutex<HashMap<String, FakeDevice>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_device(self, host: &str, device: FakeDevice) -> Self {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(host.to_string(), device);
        }
        self
    }
}

impl Connector for FakeConnector {
    type Shell = StreamShell<DuplexStream>;

    fn connect(&self, host: &str) -> impl Future<Output = Result<Self::Shell>> + Send {
        let device = self
            .devices
            .lock()
            .ok()
            .and_then(|mut devices| devices.remove(host));
        let host = host.to_string();
        async move {
            match device {
                Some(device) => Ok(device.spawn()),
                None => Err(TransportError::ConnectionFailed {
                    host,
                    port: 22,
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
                }
                .into()),
            }
        }
    }
}

/// Stores artifacts in memory, except for one host whose writes all fail.
#[derive(Debug, Default)]
pub(crate) struct RejectingSink {
    stored: MemorySink,
    rejected: String,
}

impl RejectingSink {
    pub(crate) fn new(rejected: &str) -> Self {
        Self {
            stored: MemorySink::new(),
            rejected: rejected.to_string(),
        }
    }

    /// Artifacts that were accepted.
    pub(crate) fn stored(&self) -> &MemorySink {
        &self.stored
    }
}

impl ArtifactSink for RejectingSink {
    fn persist(&self, artifact: &Artifact) -> impl Future<Output = std::result::Result<(), ArtifactError>> + Send {
        async move {
            if artifact.key.host == self.rejected {
                return Err(ArtifactError::Write {
                    path: PathBuf::from(format!("configs/{}.log", artifact.key.host)),
                    source: io::Error::other("no space left on device"),
                });
            }
            self.stored.persist(artifact).await
        }
    }
}
