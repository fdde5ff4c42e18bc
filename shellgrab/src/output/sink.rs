//! Artifact persistence.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use log::debug;
use tokio::io::AsyncWriteExt;

use super::router::{Artifact, ArtifactKey, ArtifactKind, WriteMode};
use crate::error::ArtifactError;

/// Destination for routed artifacts.
///
/// One sink is shared by every host task. Keys include the host, so
/// concurrent writers never target the same artifact.
pub trait ArtifactSink: Send + Sync {
    /// Write or append one artifact.
    fn persist(&self, artifact: &Artifact) -> impl Future<Output = Result<(), ArtifactError>> + Send;
}

/// Writes configs and transcripts as files.
///
/// ```text
/// <config_dir>/<host>-<stamp>-config.log
/// <log_dir>/<host>-session-<stamp>.log
/// ```
#[derive(Debug, Clone)]
pub struct FsSink {
    config_dir: PathBuf,
    log_dir: PathBuf,
}

impl FsSink {
    /// Create a sink writing under the two directories.
    pub fn new(config_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    /// Create both directories if they do not exist.
    pub async fn prepare(&self) -> Result<(), ArtifactError> {
        for dir in [&self.config_dir, &self.log_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| ArtifactError::Write {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// File path for an artifact key.
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        let host = sanitize(&key.host);
        match key.kind {
            ArtifactKind::Config => self.config_dir.join(format!("{host}-{}-config.log", key.stamp)),
            ArtifactKind::Transcript => self.log_dir.join(format!("{host}-session-{}.log", key.stamp)),
        }
    }
}

impl ArtifactSink for FsSink {
    async fn persist(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let path = self.path_for(&artifact.key);
        debug!("writing {} bytes to {}", artifact.body.len(), path.display());
        write_file(&path, artifact.mode, artifact.body.as_bytes())
            .await
            .map_err(|source| ArtifactError::Write { path, source })
    }
}

async fn write_file(path: &Path, mode: WriteMode, body: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    match mode {
        WriteMode::Replace => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.append(true).create(true),
    };
    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.flush().await
}

/// Host names become file-name prefixes; keep them to one path component.
fn sanitize(host: &str) -> String {
    host.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

/// Keeps artifacts in memory, keyed like [`FsSink`] files.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<IndexMap<ArtifactKey, String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of every artifact of `kind` written for `host`, in write order.
    pub fn artifacts(&self, host: &str, kind: ArtifactKind) -> Vec<String> {
        self.artifacts
            .lock()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| key.host == host && key.kind == kind)
                    .map(|(_, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Key stamps of every artifact of `kind` written for `host`.
    pub fn stamps(&self, host: &str, kind: ArtifactKind) -> Vec<String> {
        self.artifacts
            .lock()
            .map(|map| {
                map.keys()
                    .filter(|key| key.host == host && key.kind == kind)
                    .map(|key| key.stamp.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let mut map = self.artifacts.lock().map_err(|_| ArtifactError::Write {
            path: PathBuf::from(format!("memory:{}", artifact.key.host)),
            source: std::io::Error::other("artifact store poisoned"),
        })?;
        let body = map.entry(artifact.key.clone()).or_default();
        match artifact.mode {
            WriteMode::Replace => *body = artifact.body.clone(),
            WriteMode::Append => body.push_str(&artifact.body),
        }
        Ok(())
    }
}

impl ArtifactSink for MemorySink {
    fn persist(&self, artifact: &Artifact) -> impl Future<Output = Result<(), ArtifactError>> + Send {
        std::future::ready(self.store(artifact))
    }
}
