use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::models::{UpdateRecord, UpdateStatus};
use crate::utils::fs::atomic_write;

/// On-disk format version of the ledger file.
const LEDGER_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    format: u32,
    records: Vec<UpdateRecord>,
}

/// Ordered record of update attempts and the snapshots they own.
///
/// Records are appended in chronological order and never edited; pruning removes
/// them from the front. The ledger is the source of truth for which snapshots exist:
/// every snapshot the engine keeps has exactly one record, and pruning deletes the
/// snapshot together with its record.
///
/// A ledger is either in-memory (lost when the process exits) or backed by a JSON
/// file written atomically on [`save`](Self::save).
#[derive(Debug, Default)]
pub struct HistoryLedger {
    records: Vec<UpdateRecord>,
    path: Option<PathBuf>,
}

impl HistoryLedger {
    /// An empty ledger that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the ledger stored at `path`, or starts an empty one if the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read history ledger {path:?}"))?;
            let file: LedgerFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse history ledger {path:?}"))?;
            debug!("Loaded {} history records from {:?}", file.records.len(), path);
            file.records
        } else {
            Vec::new()
        };

        Ok(Self {
            records,
            path: Some(path),
        })
    }

    /// Writes the ledger to its file. No-op for in-memory ledgers.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_vec_pretty(&LedgerFile {
            format: LEDGER_FORMAT,
            records: self.records.clone(),
        })
        .context("Failed to serialize history ledger")?;

        let path = path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .context("Ledger write task panicked")?
    }

    pub fn append(&mut self, record: UpdateRecord) {
        debug!("Recording {} for version {}", record.status, record.version);
        self.records.push(record);
    }

    /// Records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[UpdateRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recent successful update to `version`.
    ///
    /// Failed and rolled-back attempts are ignored: their snapshots were taken with
    /// the installation already at or past the state they would restore.
    #[must_use]
    pub fn latest_success_for_version(&self, version: &str) -> Option<&UpdateRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.version == version && r.status == UpdateStatus::Success)
    }

    /// The most recent successful update, i.e. the installed version as far as the
    /// ledger knows.
    #[must_use]
    pub fn latest_success(&self) -> Option<&UpdateRecord> {
        self.records.iter().rev().find(|r| r.status == UpdateStatus::Success)
    }

    /// Removes and returns the oldest records so that at most `keep` remain.
    pub fn drain_oldest(&mut self, keep: usize) -> Vec<UpdateRecord> {
        let excess = self.records.len().saturating_sub(keep);
        self.records.drain(..excess).collect()
    }

    /// Backing file, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
