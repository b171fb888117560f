use anyhow::{Context, Result, bail};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::ArchiveCodec;
use crate::models::UpdateRecord;
use crate::upgrade::history::HistoryLedger;
use crate::utils::fs::{TempDir, copy_file_with_permissions, ensure_dir};

/// Snapshots of an installation directory, taken before every update.
///
/// `BackupManager` archives the whole installation directory into
/// `<install_dir>/<state_dir>/backups/backup_<timestamp>.tar.gz` and can restore the
/// directory from such a snapshot. The state directory itself (backups, staging
/// areas, the history ledger) is never part of a snapshot and is never touched by a
/// restore.
///
/// # Snapshot Scope
///
/// Snapshots contain every file of the installation, including files protected by
/// preserve patterns: preservation is an apply-time rule, so a restore brings back
/// exactly what was there before the update.
///
/// # Restore Semantics
///
/// A restore first unpacks the snapshot into a staging directory, so a missing or
/// corrupt snapshot fails before the installation is touched. It then removes every
/// installation entry except the state directory and copies the staged tree in. The
/// resulting file set equals the snapshot's, and restoring the same snapshot twice
/// yields the same directory.
///
/// # Pruning
///
/// [`prune`](Self::prune) keeps the newest `retention` ledger entries and deletes the
/// snapshot files of the rest. Deletion failures are logged and never returned.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use updraft::archive::TarGzCodec;
/// use updraft::upgrade::BackupManager;
///
/// # async fn example() -> anyhow::Result<()> {
/// let manager = BackupManager::new("/opt/myapp".into(), ".updraft", Arc::new(TarGzCodec));
/// let snapshot = manager.create_backup(&CancellationToken::new()).await?;
/// // ... the update fails ...
/// manager.restore_backup(&snapshot).await?;
/// # Ok(())
/// # }
/// ```
pub struct BackupManager {
    install_dir: PathBuf,
    state_dir_name: String,
    codec: Arc<dyn ArchiveCodec>,
}

impl BackupManager {
    /// Restoring retries the swap phase, which can fail transiently while files are
    /// held open (notably on Windows).
    const MAX_RESTORE_ATTEMPTS: u32 = 3;

    pub fn new(install_dir: PathBuf, state_dir_name: &str, codec: Arc<dyn ArchiveCodec>) -> Self {
        Self {
            install_dir,
            state_dir_name: state_dir_name.to_string(),
            codec,
        }
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// `<install_dir>/<state_dir>`.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.install_dir.join(&self.state_dir_name)
    }

    /// `<install_dir>/<state_dir>/backups`.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir().join("backups")
    }

    /// Picks an unused `backup_<timestamp>.tar.gz` path.
    fn next_backup_path(&self) -> PathBuf {
        let dir = self.backups_dir();
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let mut candidate = dir.join(format!("backup_{stamp}.tar.gz"));
        let mut counter = 1;
        while candidate.exists() {
            candidate = dir.join(format!("backup_{stamp}_{counter}.tar.gz"));
            counter += 1;
        }
        candidate
    }

    /// Archives the installation directory and returns the snapshot path.
    ///
    /// A partially written snapshot is removed before the error is returned.
    pub async fn create_backup(&self, cancel: &CancellationToken) -> Result<PathBuf> {
        if !self.install_dir.is_dir() {
            bail!("Installation directory does not exist: {:?}", self.install_dir);
        }

        let backups_dir = self.backups_dir();
        fs::create_dir_all(&backups_dir)
            .await
            .with_context(|| format!("Failed to create backup directory {backups_dir:?}"))?;

        let backup_path = self.next_backup_path();
        info!("Creating backup at {:?}", backup_path);

        let codec = Arc::clone(&self.codec);
        let src = self.install_dir.clone();
        let dest = backup_path.clone();
        let exclude = vec![self.state_dir_name.clone()];
        let cancel = cancel.clone();
        let result =
            tokio::task::spawn_blocking(move || codec.pack(&src, &dest, &exclude, &cancel))
                .await
                .context("Backup task panicked")
                .and_then(|r| r);

        match result {
            Ok(files) => {
                info!("Backup created successfully ({} files)", files);
                Ok(backup_path)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&backup_path).await {
                    debug!("No partial backup to remove at {:?}: {}", backup_path, cleanup);
                }
                Err(e.context("Failed to create backup"))
            }
        }
    }

    /// Restores the installation directory from a snapshot.
    ///
    /// Not cancellable: once started, a restore runs to completion.
    pub async fn restore_backup(&self, backup_path: &Path) -> Result<()> {
        if !backup_path.is_file() {
            bail!("No backup found at {:?}", backup_path);
        }

        warn!("Restoring from backup at {:?}", backup_path);

        let state_dir = self.state_dir();
        ensure_dir(&state_dir)?;
        let staging = TempDir::new_in(&state_dir, "restore")?;

        let codec = Arc::clone(&self.codec);
        let archive = backup_path.to_path_buf();
        let staging_path = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || {
            codec.unpack(&archive, &staging_path, &CancellationToken::new())
        })
        .await
        .context("Restore task panicked")?
        .with_context(|| format!("Backup {backup_path:?} is unreadable"))?;

        let mut attempts = 0;
        while attempts < Self::MAX_RESTORE_ATTEMPTS {
            match self.attempt_restore(staging.path()).await {
                Ok(()) => {
                    info!("Successfully restored from backup");
                    return Ok(());
                }
                Err(e) if attempts < Self::MAX_RESTORE_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {:#}. Retrying...", attempts + 1, e);
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }

        bail!("Failed to restore backup after {} attempts", Self::MAX_RESTORE_ATTEMPTS)
    }

    /// Clears the installation (except the state directory) and copies `staged` in.
    async fn attempt_restore(&self, staged: &Path) -> Result<()> {
        let mut entries = fs::read_dir(&self.install_dir)
            .await
            .with_context(|| format!("Failed to read {:?}", self.install_dir))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy() == self.state_dir_name {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                fs::remove_dir_all(&path)
                    .await
                    .with_context(|| format!("Failed to remove {path:?}"))?;
            } else {
                fs::remove_file(&path).await.with_context(|| format!("Failed to remove {path:?}"))?;
            }
        }

        for entry in WalkDir::new(staged).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {staged:?}"))?;
            let relative = entry.path().strip_prefix(staged)?;
            let target = self.install_dir.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .await
                    .with_context(|| format!("Failed to create {target:?}"))?;
            } else {
                copy_file_with_permissions(entry.path(), &target).await?;
            }
        }

        Ok(())
    }

    /// Removes the oldest ledger entries beyond `retention` and deletes their snapshots.
    ///
    /// Returns the removed entries. File deletion errors are logged only.
    pub async fn prune(&self, ledger: &mut HistoryLedger, retention: usize) -> Vec<UpdateRecord> {
        let removed = ledger.drain_oldest(retention);

        for record in &removed {
            match fs::remove_file(&record.backup_path).await {
                Ok(()) => debug!("Removed old backup {:?}", record.backup_path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Old backup already gone: {:?}", record.backup_path);
                }
                Err(e) => warn!("Failed to remove old backup {:?}: {}", record.backup_path, e),
            }
        }

        if !removed.is_empty() {
            info!("Pruned {} old backup(s), keeping {}", removed.len(), ledger.len());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarGzCodec;
    use crate::models::UpdateStatus;
    use tempfile::tempdir;

    fn manager(install: &Path) -> BackupManager {
        BackupManager::new(install.to_path_buf(), ".updraft", Arc::new(TarGzCodec))
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_backup_excludes_state_dir() {
        let temp = tempdir().unwrap();
        let install = temp.path();
        write(&install.join("app"), "v1");
        let manager = manager(install);

        let first = manager.create_backup(&CancellationToken::new()).await.unwrap();
        let second = manager.create_backup(&CancellationToken::new()).await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with(manager.backups_dir()));
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("backup_"));

        let out = temp.path().join("inspect");
        TarGzCodec.unpack(&second, &out, &CancellationToken::new()).unwrap();
        assert!(out.join("app").exists());
        assert!(!out.join(".updraft").exists());
    }

    #[tokio::test]
    async fn test_restore_is_exact_and_idempotent() {
        let temp = tempdir().unwrap();
        let install = temp.path().join("install");
        write(&install.join("app"), "v1");
        write(&install.join("lib/core.so"), "core-v1");
        let manager = manager(&install);
        let backup = manager.create_backup(&CancellationToken::new()).await.unwrap();

        write(&install.join("app"), "v2-partial");
        write(&install.join("lib/new.so"), "new");
        std::fs::remove_file(install.join("lib/core.so")).unwrap();

        manager.restore_backup(&backup).await.unwrap();
        manager.restore_backup(&backup).await.unwrap();

        assert_eq!(std::fs::read_to_string(install.join("app")).unwrap(), "v1");
        assert_eq!(std::fs::read_to_string(install.join("lib/core.so")).unwrap(), "core-v1");
        assert!(!install.join("lib/new.so").exists());
        assert!(backup.exists(), "restore must not delete the snapshot");
    }

    #[tokio::test]
    async fn test_restore_missing_or_corrupt_backup() {
        let temp = tempdir().unwrap();
        let install = temp.path().join("install");
        write(&install.join("app"), "live");
        let manager = manager(&install);

        let missing = manager.backups_dir().join("backup_missing.tar.gz");
        let err = manager.restore_backup(&missing).await.unwrap_err();
        assert!(err.to_string().contains("No backup found"));

        let corrupt = temp.path().join("corrupt.tar.gz");
        std::fs::write(&corrupt, "garbage").unwrap();
        assert!(manager.restore_backup(&corrupt).await.is_err());
        assert_eq!(std::fs::read_to_string(install.join("app")).unwrap(), "live");
    }

    #[tokio::test]
    async fn test_create_backup_missing_install_dir() {
        let temp = tempdir().unwrap();
        let manager = manager(&temp.path().join("absent"));
        assert!(manager.create_backup(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let temp = tempdir().unwrap();
        let install = temp.path();
        write(&install.join("app"), "v1");
        let manager = manager(install);
        let mut ledger = HistoryLedger::in_memory();

        let mut paths = Vec::new();
        for version in ["1.1", "1.2", "1.3"] {
            let path = manager.create_backup(&CancellationToken::new()).await.unwrap();
            ledger.append(UpdateRecord::now(version, UpdateStatus::Success, path.clone()));
            paths.push(path);
        }

        let removed = manager.prune(&mut ledger, 2).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].version, "1.1");
        assert!(!paths[0].exists());
        assert!(paths[1].exists() && paths[2].exists());
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_tolerates_missing_files() {
        let temp = tempdir().unwrap();
        let manager = manager(temp.path());
        let mut ledger = HistoryLedger::in_memory();
        ledger.append(UpdateRecord::now("1.0", UpdateStatus::Success, temp.path().join("gone")));
        ledger.append(UpdateRecord::now("1.1", UpdateStatus::Success, temp.path().join("gone2")));

        let removed = manager.prune(&mut ledger, 1).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(ledger.records()[0].version, "1.1");
    }
}
