//! Archive packing and unpacking
//!
//! Releases and backups are gzip-compressed tarballs. [`ArchiveCodec`] is the seam the
//! backup manager and the orchestrator use; [`TarGzCodec`] implements it with the
//! `tar` and `flate2` crates.
//!
//! # Safety Rules for Unpacking
//!
//! - Entry paths that are absolute or contain `..` are rejected and abort the unpack
//! - Only directories and regular files are materialised; links and device entries
//!   are skipped
//! - Unix permission bits recorded in the archive are restored
//!
//! Both operations are blocking and should run under `tokio::task::spawn_blocking`.
//! They check the cancellation token between entries and fail with
//! [`UpdateError::Cancelled`] once it fires.

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::core::UpdateError;

/// Creates and extracts archive snapshots of a directory tree.
pub trait ArchiveCodec: Send + Sync {
    /// Archives every entry under `src` into `dest`.
    ///
    /// Top-level entries of `src` named in `exclude` are left out together with their
    /// contents. Returns the number of regular files written.
    fn pack(
        &self,
        src: &Path,
        dest: &Path,
        exclude: &[String],
        cancel: &CancellationToken,
    ) -> Result<usize>;

    /// Extracts `archive` into `dest`, creating `dest` if needed.
    ///
    /// Returns the number of regular files written.
    fn unpack(&self, archive: &Path, dest: &Path, cancel: &CancellationToken) -> Result<usize>;
}

/// `.tar.gz` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzCodec;

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(UpdateError::Cancelled.into());
    }
    Ok(())
}

/// Validates an archive entry path and returns it relative to the extraction root.
fn sanitize_entry_path(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("Archive entry escapes the extraction directory: {}", path.display())
            }
        }
    }
    Ok(clean)
}

impl ArchiveCodec for TarGzCodec {
    fn pack(
        &self,
        src: &Path,
        dest: &Path,
        exclude: &[String],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let file = File::create(dest)
            .with_context(|| format!("Failed to create archive: {}", dest.display()))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        let mut files = 0;
        let walker = WalkDir::new(src)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() != 1
                    || !exclude.iter().any(|name| entry.file_name().to_string_lossy() == *name)
            });

        for entry in walker {
            check_cancelled(cancel)?;
            let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .with_context(|| format!("{} is outside {}", entry.path().display(), src.display()))?;

            let file_type = entry.file_type();
            if file_type.is_dir() {
                builder
                    .append_dir(relative, entry.path())
                    .with_context(|| format!("Failed to archive directory {}", relative.display()))?;
            } else if file_type.is_file() {
                builder
                    .append_path_with_name(entry.path(), relative)
                    .with_context(|| format!("Failed to archive file {}", relative.display()))?;
                files += 1;
                trace!("Archived {}", relative.display());
            } else {
                warn!("Skipping non-regular file {}", relative.display());
            }
        }

        let encoder = builder.into_inner().context("Failed to finish tar stream")?;
        let writer = encoder.finish().context("Failed to finish gzip stream")?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|f| f.sync_all())
            .with_context(|| format!("Failed to flush archive: {}", dest.display()))?;

        debug!("Packed {} files from {} into {}", files, src.display(), dest.display());
        Ok(files)
    }

    fn unpack(&self, archive: &Path, dest: &Path, cancel: &CancellationToken) -> Result<usize> {
        let file = File::open(archive)
            .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
        let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        tarball.set_preserve_permissions(true);

        std::fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

        let mut files = 0;
        let entries = tarball
            .entries()
            .with_context(|| format!("Failed to read archive: {}", archive.display()))?;

        for entry in entries {
            check_cancelled(cancel)?;
            let mut entry = entry
                .with_context(|| format!("Failed to read archive entry in {}", archive.display()))?;
            let raw_path = entry.path().context("Archive entry has an invalid path")?.into_owned();
            let relative = sanitize_entry_path(&raw_path)?;
            if relative.as_os_str().is_empty() {
                continue;
            }
            let target = dest.join(&relative);

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                std::fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create directory: {}", target.display()))?;
            } else if entry_type.is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create directory: {}", parent.display())
                    })?;
                }
                entry
                    .unpack(&target)
                    .with_context(|| format!("Failed to extract {}", relative.display()))?;
                files += 1;
            } else {
                debug!("Skipping unsupported archive entry {}", raw_path.display());
            }
        }

        debug!("Unpacked {} files from {} into {}", files, archive.display(), dest.display());
        Ok(files)
    }
}
