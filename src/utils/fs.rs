//! File system helpers shared by the backup, apply and history components.
//!
//! Synchronous helpers (`ensure_dir`, `atomic_write`, ...) are used from blocking
//! contexts such as archive work running under `spawn_blocking`; the async helpers
//! use `tokio::fs` and are used from the engine's async paths.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Creates a directory and all of its parents if it does not exist.
///
/// Fails if `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| {
            let platform_help = if crate::utils::platform::is_windows() {
                "On Windows: Check that the path length is < 260 chars or that long path support is enabled"
            } else {
                "Check directory permissions and path validity"
            };

            format!("Failed to create directory: {}\n\n{}", path.display(), platform_help)
        })?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Creates the parent directory of `path` if needed.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Writes `content` to `path` through a temporary sibling and a rename.
///
/// Readers see either the previous content or the new content, never a partial file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    ensure_parent_dir(path)?;

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Copies `src` to `dst`, creating parent directories and keeping permission bits.
pub async fn copy_file_with_permissions(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    tokio::fs::copy(src, dst)
        .await
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;

    #[cfg(unix)]
    {
        let metadata = tokio::fs::metadata(src)
            .await
            .with_context(|| format!("Failed to read metadata: {}", src.display()))?;
        tokio::fs::set_permissions(dst, metadata.permissions())
            .await
            .with_context(|| format!("Failed to set permissions on {}", dst.display()))?;
    }

    Ok(())
}

/// A scratch directory removed when dropped.
///
/// Used for extraction and download staging so the scratch space is cleaned up on
/// every exit path, including early returns through `?` and panics.
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// Creates `updraft_<prefix>_<uuid>` under the system temp directory.
    pub fn new(prefix: &str) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    /// Creates `updraft_<prefix>_<uuid>` under `parent`.
    ///
    /// Staging next to the installation keeps later renames on one filesystem.
    pub fn new_in(parent: &Path, prefix: &str) -> Result<Self> {
        let unique_name = format!("updraft_{}_{}", prefix, uuid::Uuid::new_v4());
        let path = parent.join(unique_name);

        ensure_dir(&path)?;

        Ok(Self {
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if let Err(e) = remove_dir_all(&self.path) {
            tracing::warn!("Failed to remove scratch directory {}: {e:#}", self.path.display());
        }
    }
}
