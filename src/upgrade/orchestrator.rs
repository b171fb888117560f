use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::archive::{ArchiveCodec, TarGzCodec};
use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::models::{UpdateRecord, UpdateStatus, VersionInfo};
use crate::upgrade::apply::{ApplyEngine, ApplyProgressCallback};
use crate::upgrade::backup::BackupManager;
use crate::upgrade::history::HistoryLedger;
use crate::utils::fs::TempDir;

/// Where the orchestrator is in the update sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    BackingUp,
    Extracting,
    Applying,
    /// The release was applied.
    Succeeded,
    /// Applying failed and the snapshot was restored.
    RolledBack,
    /// The update stopped with the installation untouched, or both the update and
    /// the restore failed.
    Fatal,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::BackingUp => "backing up",
            Self::Extracting => "extracting",
            Self::Applying => "applying",
            Self::Succeeded => "succeeded",
            Self::RolledBack => "rolled back",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub version: String,
    /// Snapshot taken before the update; kept until pruned.
    pub backup_path: PathBuf,
    pub files_copied: usize,
    pub files_preserved: usize,
    /// Number of old snapshots deleted by pruning.
    pub backups_pruned: usize,
}

/// Sequences backup, extraction, apply, history and pruning for one installation.
///
/// ```text
/// Idle → BackingUp → Extracting → Applying → Succeeded
///            │            │           └────→ RolledBack (restore ok)
///            └────────────┴──────────────→ Fatal
/// ```
///
/// - A backup failure stops the update before anything is touched.
/// - Extraction happens in a scratch directory that is removed on every exit path.
/// - An apply failure always triggers a restore. The error says whether the restore
///   worked ([`UpdateError::UpdateFailed`]) or not
///   ([`UpdateError::UpdateAndRollbackFailed`]).
/// - A success appends one `success` record and prunes old snapshots.
/// - Attempts that fail after the snapshot exists are recorded as `failed` or
///   `rolled_back`, so their snapshot is tracked and pruned like any other.
///
/// `update` and `rollback` take `&mut self`: one orchestrator runs one operation at a
/// time. Separate orchestrators over the same installation must be serialized by the
/// caller.
pub struct UpdateOrchestrator {
    install_dir: PathBuf,
    backups: BackupManager,
    engine: ApplyEngine,
    codec: Arc<dyn ArchiveCodec>,
    ledger: HistoryLedger,
    backup_count: usize,
    state: UpdateState,
}

impl UpdateOrchestrator {
    /// File name of the persistent ledger inside the state directory.
    pub const HISTORY_FILE: &'static str = "history.json";

    /// Builds an orchestrator over `install_dir` with the given ledger.
    pub fn new(config: &UpdaterConfig, install_dir: impl Into<PathBuf>, ledger: HistoryLedger) -> Self {
        Self::with_codec(config, install_dir, ledger, Arc::new(TarGzCodec))
    }

    /// Same as [`new`](Self::new) with a custom archive codec.
    pub fn with_codec(
        config: &UpdaterConfig,
        install_dir: impl Into<PathBuf>,
        ledger: HistoryLedger,
        codec: Arc<dyn ArchiveCodec>,
    ) -> Self {
        let install_dir = install_dir.into();
        Self {
            backups: BackupManager::new(install_dir.clone(), config.state_dir(), Arc::clone(&codec)),
            engine: ApplyEngine::new(config.preserve_matcher(), config.state_dir()),
            codec,
            ledger,
            backup_count: config.backup_count(),
            state: UpdateState::Idle,
            install_dir,
        }
    }

    /// Builds an orchestrator whose ledger persists at
    /// `<install_dir>/<state_dir>/history.json`.
    pub async fn open(config: &UpdaterConfig, install_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let install_dir = install_dir.into();
        let ledger_path = install_dir.join(config.state_dir()).join(Self::HISTORY_FILE);
        let ledger = HistoryLedger::open(ledger_path).await?;
        Ok(Self::new(config, install_dir, ledger))
    }

    /// Reports per-file progress during the apply step.
    pub fn set_apply_progress(&mut self, callback: Option<ApplyProgressCallback>) {
        self.engine.set_progress(callback);
    }

    #[must_use]
    pub const fn state(&self) -> UpdateState {
        self.state
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Ledger records, oldest first.
    #[must_use]
    pub fn history(&self) -> &[UpdateRecord] {
        self.ledger.records()
    }

    #[must_use]
    pub const fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Journals an attempt, prunes snapshots beyond `backup_count` and saves the ledger.
    ///
    /// Returns the records whose snapshots were pruned.
    async fn record(
        &mut self,
        version: &str,
        status: UpdateStatus,
        backup_path: &Path,
    ) -> Vec<UpdateRecord> {
        self.ledger.append(UpdateRecord::now(version, status, backup_path.to_path_buf()));
        let pruned = self.backups.prune(&mut self.ledger, self.backup_count).await;
        self.persist().await;
        pruned
    }

    async fn persist(&self) {
        if let Err(e) = self.ledger.save().await {
            warn!("Failed to save update history: {e:#}");
        }
    }

    fn is_cancellation(error: &anyhow::Error) -> bool {
        matches!(error.downcast_ref::<UpdateError>(), Some(UpdateError::Cancelled))
    }

    /// Installs the release archive at `artifact` as `version`.
    ///
    /// The artifact must already be verified. Cancellation before the apply step
    /// returns [`UpdateError::Cancelled`] with the installation untouched; during the
    /// apply step it triggers a restore like any other apply failure.
    pub async fn update(
        &mut self,
        version: &VersionInfo,
        artifact: &Path,
        cancel: &CancellationToken,
    ) -> Result<UpdateReport, UpdateError> {
        let target = version.version.as_str();
        info!("Updating {:?} to version {}", self.install_dir, target);

        if cancel.is_cancelled() {
            self.state = UpdateState::Idle;
            return Err(UpdateError::Cancelled);
        }

        self.state = UpdateState::BackingUp;
        let backup_path = match self.backups.create_backup(cancel).await {
            Ok(path) => path,
            Err(e) if Self::is_cancellation(&e) => {
                self.state = UpdateState::Idle;
                return Err(UpdateError::Cancelled);
            }
            Err(e) => {
                self.state = UpdateState::Fatal;
                return Err(UpdateError::BackupFailed {
                    source: e,
                });
            }
        };

        self.state = UpdateState::Extracting;
        let scratch = match TempDir::new_in(&self.backups.state_dir(), "extract") {
            Ok(dir) => dir,
            Err(e) => {
                self.state = UpdateState::Fatal;
                self.record(target, UpdateStatus::Failed, &backup_path).await;
                return Err(UpdateError::CreateDirFailed {
                    path: self.backups.state_dir(),
                    source: e,
                });
            }
        };

        let codec = Arc::clone(&self.codec);
        let archive = artifact.to_path_buf();
        let dest = scratch.path().to_path_buf();
        let unpack_cancel = cancel.clone();
        let extracted = tokio::task::spawn_blocking(move || codec.unpack(&archive, &dest, &unpack_cancel))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);

        if let Err(e) = extracted {
            let cancelled = Self::is_cancellation(&e);
            self.state = if cancelled { UpdateState::Idle } else { UpdateState::Fatal };
            self.record(target, UpdateStatus::Failed, &backup_path).await;
            return Err(if cancelled {
                UpdateError::Cancelled
            } else {
                UpdateError::ExtractFailed {
                    source: e,
                }
            });
        }

        self.state = UpdateState::Applying;
        let applied = self.engine.apply(scratch.path(), &self.install_dir, cancel).await;
        drop(scratch);

        let report = match applied {
            Ok(report) => report,
            Err(apply_error) => {
                warn!("Update to {} failed, rolling back: {:#}", target, apply_error);
                return Err(self.recover(target, &backup_path, apply_error).await);
            }
        };

        self.state = UpdateState::Succeeded;
        let pruned = self.record(target, UpdateStatus::Success, &backup_path).await;

        info!(
            "Updated to version {} ({} files applied, {} preserved)",
            target,
            report.copied.len(),
            report.preserved.len()
        );
        Ok(UpdateReport {
            version: target.to_string(),
            backup_path,
            files_copied: report.copied.len(),
            files_preserved: report.preserved.len(),
            backups_pruned: pruned.len(),
        })
    }

    /// Restores the pre-update snapshot after a failed apply.
    async fn recover(&mut self, target: &str, backup_path: &Path, apply_error: anyhow::Error) -> UpdateError {
        match self.backups.restore_backup(backup_path).await {
            Ok(()) => {
                self.state = UpdateState::RolledBack;
                self.record(target, UpdateStatus::RolledBack, backup_path).await;
                UpdateError::UpdateFailed {
                    source: apply_error,
                }
            }
            Err(rollback_error) => {
                error!("Rollback after failed update to {} also failed: {:#}", target, rollback_error);
                self.state = UpdateState::Fatal;
                self.record(target, UpdateStatus::Failed, backup_path).await;
                UpdateError::UpdateAndRollbackFailed {
                    update_error: format!("{apply_error:#}"),
                    rollback_error: format!("{rollback_error:#}"),
                }
            }
        }
    }

    /// Restores the snapshot taken before the most recent successful update to `version`.
    ///
    /// The ledger is not modified. Returns the snapshot that was restored.
    pub async fn rollback(&mut self, version: &str) -> Result<PathBuf, UpdateError> {
        let Some(record) = self.ledger.latest_success_for_version(version) else {
            return Err(UpdateError::BackupNotFound {
                version: version.to_string(),
            });
        };
        let backup_path = record.backup_path.clone();

        info!("Rolling back update to version {} from {:?}", version, backup_path);
        self.backups.restore_backup(&backup_path).await.map_err(|e| UpdateError::RollbackFailed {
            source: e,
        })?;

        info!("Rollback of version {} complete", version);
        Ok(backup_path)
    }
}
