//! Append-only judgment log (JSON Lines)
//!
//! One judgment record per line, no header, never rewritten. The log is the
//! durable source of truth; the sync daemon only ever uploads it.
//!
//! Appends within this process go through a single-writer lock and each
//! batch is issued as one `write_all` on a file opened in append mode, so
//! batches from concurrent sessions never interleave. Several processes
//! appending to the same file is not supported.
//!
//! A batch whose write fails partway is cut back off the file, so a
//! resubmitted session never duplicates lines that made it to disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pairpick_common::{Error, JudgmentRecord, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::counts::{CountIndex, CountSource};

pub struct JudgmentLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JudgmentLog {
    /// Handle for the log at `path` (no I/O performed)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    /// Create the parent directory and the log file if missing, and verify
    /// the file can be opened for appending
    pub async fn prepare(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.persistence_error(source))?;
        }
        self.open_for_append().await?;
        info!(path = %self.path.display(), "Judgment log ready");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records as one batch
    ///
    /// The batch is serialized up front and written with a single call; an
    /// error means the caller must treat the whole batch as not persisted.
    pub async fn append(&self, records: &[JudgmentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut batch = String::new();
        for record in records {
            batch.push_str(&serde_json::to_string(record)?);
            batch.push('\n');
        }

        let _guard = self.writer.lock().await;
        let mut file = self.open_for_append().await?;
        let start_len = file
            .metadata()
            .await
            .map_err(|source| self.persistence_error(source))?
            .len();

        let written = match file.write_all(batch.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            self.truncate_to(&file, start_len).await;
            return Err(self.persistence_error(source));
        }

        debug!(path = %self.path.display(), lines = records.len(), "Appended judgments");
        Ok(())
    }

    /// Read every line of the log (empty when the file does not exist)
    pub async fn read_all(&self) -> Result<String> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Drop whatever part of a failed batch reached the file
    async fn truncate_to(&self, file: &tokio::fs::File, len: u64) {
        if let Err(e) = file.set_len(len).await {
            warn!(
                path = %self.path.display(),
                len,
                error = %e,
                "Could not remove partial batch from judgment log"
            );
        }
    }

    async fn open_for_append(&self) -> Result<tokio::fs::File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.persistence_error(source))
    }

    fn persistence_error(&self, source: std::io::Error) -> Error {
        Error::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

/// Full re-read of the log on every call
#[async_trait]
impl CountSource for JudgmentLog {
    async fn count_index(&self) -> Result<CountIndex> {
        let content = self.read_all().await?;
        Ok(CountIndex::from_log_lines(content.lines()))
    }
}
