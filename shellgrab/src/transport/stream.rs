//! [`Shell`] over any async byte stream.
//!
//! Useful for devices reached through a console server or a local pipe,
//! and for driving the session protocol against an in-memory peer.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Shell;
use crate::error::{ChannelError, Result};

const READ_CHUNK: usize = 8192;

/// Interactive shell backed by an `AsyncRead + AsyncWrite` stream.
#[derive(Debug)]
pub struct StreamShell<S> {
    stream: S,
    read_buf: BytesMut,
}

impl<S> StreamShell<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }
}

impl<S> Shell for StreamShell<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await.map_err(ChannelError::Io)?;
        self.stream.flush().await.map_err(ChannelError::Io)?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Bytes>> {
        self.read_buf.reserve(READ_CHUNK);
        match tokio::time::timeout(wait, self.stream.read_buf(&mut self.read_buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(ChannelError::Closed.into()),
            Ok(Ok(_)) => Ok(Some(self.read_buf.split().freeze())),
            Ok(Err(e)) => Err(ChannelError::Io(e).into()),
        }
    }

    async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(ChannelError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_recv_times_out_without_data() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut shell = StreamShell::new(client);
        let got = shell.recv(Duration::from_secs(1)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_send_and_recv() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut shell = StreamShell::new(client);

        shell.send_line("show clock").await.unwrap();
        let mut buf = [0u8; 11];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"show clock\n");

        server.write_all(b"router#").await.unwrap();
        let got = shell.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(&got[..], b"router#");
    }

    #[tokio::test]
    async fn test_recv_after_peer_close_is_error() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let mut shell = StreamShell::new(client);
        let err = shell.recv(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, crate::Error::Channel(ChannelError::Closed)));
    }
}
