//! Shared, append-only log of host failures.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::ArtifactError;

/// One line per failed host: `<ctime> - <host>: <detail>`.
///
/// Every append holds the lock for the whole open-write-close cycle, so
/// entries from concurrent host tasks never interleave.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    /// Log to `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    pub async fn append(&self, host: &str, detail: impl std::fmt::Display) -> Result<(), ArtifactError> {
        let line = format!(
            "{} - {}: {}\n",
            Local::now().format("%a %b %e %H:%M:%S %Y"),
            host,
            detail
        );

        let _guard = self.lock.lock().await;
        self.write(line.as_bytes())
            .await
            .map_err(|source| ArtifactError::Write {
                path: self.path.clone(),
                source,
            })
    }

    async fn write(&self, line: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await?;
        file.flush().await
    }
}
