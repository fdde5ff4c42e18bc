//! Transport layer: byte streams bound to one remote interactive shell.
//!
//! The session protocol only needs two things from a transport: write
//! bytes, and wait a bounded time for the next bytes. [`Shell`] captures
//! that, and [`Connector`] produces a fresh shell per host. The production
//! implementation is SSH via russh ([`SshConnector`]); [`StreamShell`] adapts
//! any async byte stream.

pub mod config;
mod ssh;
mod stream;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::{SshConnector, SshShell, SshTransport};
pub use stream::StreamShell;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// An open interactive shell on one device.
///
/// A shell is owned by exactly one host task, so methods take `&mut self`
/// and only one read or write can be in flight at a time.
pub trait Shell: Send {
    /// Write raw bytes to the shell.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `wait` for the next chunk of output.
    ///
    /// Returns `Ok(None)` when nothing arrived in time and an error once the
    /// remote side has closed the channel.
    fn recv(&mut self, wait: Duration) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Close the shell and the connection under it.
    fn close(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;

    /// Write one line, terminated with `\n`.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut data = Vec::with_capacity(line.len() + 1);
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
            self.send(&data).await
        }
    }
}

/// Opens authenticated shells by host name.
pub trait Connector: Send + Sync {
    /// Shell type produced by this connector.
    type Shell: Shell;

    /// Connect to `host` and open an interactive shell.
    fn connect(&self, host: &str) -> impl Future<Output = Result<Self::Shell>> + Send;
}
