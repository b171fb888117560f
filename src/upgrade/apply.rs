use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::UpdateError;
use crate::pattern::PreserveMatcher;
use crate::utils::fs::copy_file_with_permissions;

/// Progress of a running apply step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyProgress {
    /// Files processed so far, copied or preserved.
    pub applied: usize,
    /// Files in the extracted release.
    pub total: usize,
    /// Path of the file just processed, relative to the installation root.
    pub path: PathBuf,
}

/// Apply progress callback.
///
/// Invoked synchronously after each file; it must return quickly.
pub type ApplyProgressCallback = Arc<dyn Fn(&ApplyProgress) + Send + Sync>;

/// What an apply step did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Relative paths written into the installation.
    pub copied: Vec<PathBuf>,
    /// Relative paths left untouched because a preserve pattern protects them.
    pub preserved: Vec<PathBuf>,
}

/// Merges an extracted release into the live installation.
///
/// Every regular file under the extracted tree is copied to the same relative path
/// under the installation directory, keeping its permission bits and creating parent
/// directories. A file whose relative path matches a preserve pattern is skipped when
/// the installation already has a file there; when it does not, the release copy is
/// installed. Files are visited in sorted order, so applying the same tree twice gives
/// the same result.
///
/// The first copy failure aborts the walk. The engine never undoes partial work
/// itself: the orchestrator restores the pre-update snapshot.
pub struct ApplyEngine {
    matcher: PreserveMatcher,
    state_dir_name: String,
    progress: Option<ApplyProgressCallback>,
}

impl ApplyEngine {
    pub fn new(matcher: PreserveMatcher, state_dir_name: &str) -> Self {
        Self {
            matcher,
            state_dir_name: state_dir_name.to_string(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ApplyProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn set_progress(&mut self, callback: Option<ApplyProgressCallback>) {
        self.progress = callback;
    }

    /// Regular files of `root` relative to it, sorted, without the state directory.
    fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name().to_string_lossy() != self.state_dir_name);

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {root:?}"))?;
            let relative = entry.path().strip_prefix(root)?.to_path_buf();
            if entry.file_type().is_file() {
                files.push(relative);
            } else if !entry.file_type().is_dir() {
                warn!("Skipping non-regular file in release: {}", relative.display());
            }
        }
        Ok(files)
    }

    /// Applies `extracted_dir` onto `install_dir`.
    ///
    /// Fails with [`UpdateError::Cancelled`] (wrapped in `anyhow`) when `cancel` fires
    /// between two files.
    pub async fn apply(
        &self,
        extracted_dir: &Path,
        install_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let files = self.collect_files(extracted_dir)?;
        let total = files.len();
        info!("Applying {} files to {:?}", total, install_dir);

        let mut report = ApplyReport::default();
        for (index, relative) in files.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled.into());
            }

            let source = extracted_dir.join(&relative);
            let target = install_dir.join(&relative);

            let preserved_by = self.matcher.matching_pattern(&relative).filter(|_| target.exists());
            if let Some(pattern) = preserved_by {
                debug!("Preserving {} (pattern '{}')", relative.display(), pattern);
                report.preserved.push(relative.clone());
            } else {
                copy_file_with_permissions(&source, &target)
                    .await
                    .with_context(|| format!("Failed to apply {}", relative.display()))?;
                debug!("Applied {}", relative.display());
                report.copied.push(relative.clone());
            }

            if let Some(progress) = &self.progress {
                progress(&ApplyProgress {
                    applied: index + 1,
                    total,
                    path: relative,
                });
            }
        }

        if !report.preserved.is_empty() {
            info!("Kept {} preserved file(s) unchanged", report.preserved.len());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PreserveMatch;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn engine(patterns: &[&str]) -> ApplyEngine {
        let patterns: Vec<String> = patterns.iter().map(ToString::to_string).collect();
        ApplyEngine::new(PreserveMatcher::new(&patterns, PreserveMatch::Loose).unwrap(), ".updraft")
    }

    #[tokio::test]
    async fn test_preserved_file_is_untouched() {
        let temp = tempdir().unwrap();
        let extracted = temp.path().join("extracted");
        let install = temp.path().join("install");
        write(&extracted.join("config.yaml"), "default: true");
        write(&extracted.join("bin/app"), "v2");
        write(&install.join("config.yaml"), "user: edited");
        write(&install.join("bin/app"), "v1");

        let report = engine(&["config.yaml"])
            .apply(&extracted, &install, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(install.join("config.yaml")).unwrap(), "user: edited");
        assert_eq!(std::fs::read_to_string(install.join("bin/app")).unwrap(), "v2");
        assert_eq!(report.preserved, [PathBuf::from("config.yaml")]);
        assert_eq!(report.copied, [PathBuf::from("bin/app")]);
    }

    #[tokio::test]
    async fn test_preserved_file_installed_when_absent() {
        let temp = tempdir().unwrap();
        let extracted = temp.path().join("extracted");
        let install = temp.path().join("install");
        write(&extracted.join("conf/app.conf"), "fresh");
        std::fs::create_dir_all(&install).unwrap();

        engine(&["app.conf"]).apply(&extracted, &install, &CancellationToken::new()).await.unwrap();
        assert_eq!(std::fs::read_to_string(install.join("conf/app.conf")).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let temp = tempdir().unwrap();
        let extracted = temp.path().join("extracted");
        let install = temp.path().join("install");
        write(&extracted.join("a.txt"), "a");
        write(&extracted.join("nested/b.txt"), "b");
        std::fs::create_dir_all(&install).unwrap();

        let engine = engine(&[]);
        let first = engine.apply(&extracted, &install, &CancellationToken::new()).await.unwrap();
        let second = engine.apply(&extracted, &install, &CancellationToken::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.copied, [PathBuf::from("a.txt"), PathBuf::from("nested/b.txt")]);
    }

    #[tokio::test]
    async fn test_state_dir_in_release_is_ignored() {
        let temp = tempdir().unwrap();
        let extracted = temp.path().join("extracted");
        let install = temp.path().join("install");
        write(&extracted.join(".updraft/history.json"), "[]");
        write(&extracted.join("app"), "v2");
        std::fs::create_dir_all(&install).unwrap();

        let report =
            engine(&[]).apply(&extracted, &install, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.copied, [PathBuf::from("app")]);
        assert!(!install.join(".updraft").exists());
    }

    #[tokio::test]
    async fn test_copy_failure_aborts() {
        let temp = tempdir().unwrap();
        let extracted = temp.path().join("extracted");
        let install = temp.path().join("install");
        write(&extracted.join("a.txt"), "a");
        write(&extracted.join("blocked/file.txt"), "x");
        write(&extracted.join("z.txt"), "z");
        // a regular file where the release needs a directory
        write(&install.join("blocked"), "in the way");

        let err = engine(&[]).apply(&extracted, &install, &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("blocked"));
        assert!(install.join("a.txt").exists());
        assert!(!install.join("z.txt").exists());
    }

    #[tokio::test]
    async fn test_cancel_and_progress() {
        let temp = tempdir().unwrap();
        let extracted = temp.path().join("extracted");
        let install = temp.path().join("install");
        write(&extracted.join("a.txt"), "a");
        write(&extracted.join("b.txt"), "b");
        std::fs::create_dir_all(&install).unwrap();

        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cancel_after_first = cancel.clone();
        let engine = engine(&[]).with_progress(Arc::new(move |p: &ApplyProgress| {
            sink.lock().unwrap().push((p.applied, p.total));
            cancel_after_first.cancel();
        }));

        let err = engine.apply(&extracted, &install, &cancel).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<UpdateError>(), Some(UpdateError::Cancelled)));
        assert_eq!(*seen.lock().unwrap(), [(1, 2)]);
    }

    const RELEASE_FILES: [&str; 6] =
        ["config.yaml", "app.conf", "conf/db.conf", "bin/app", "data/cache.db", "README"];
    const PATTERNS: [&str; 5] = ["config.yaml", "*.conf", "conf/*", "data", "bin/*"];

    proptest! {
        #[test]
        fn prop_existing_preserved_files_are_byte_identical(
            pattern_mask in prop::collection::vec(any::<bool>(), PATTERNS.len()),
            installed_mask in prop::collection::vec(any::<bool>(), RELEASE_FILES.len()),
            mode in prop_oneof![Just(PreserveMatch::Loose), Just(PreserveMatch::Glob)],
        ) {
            let patterns: Vec<String> = PATTERNS
                .iter()
                .zip(&pattern_mask)
                .filter(|(_, keep)| **keep)
                .map(|(p, _)| (*p).to_string())
                .collect();
            let matcher = PreserveMatcher::new(&patterns, mode).unwrap();

            let temp = tempdir().unwrap();
            let extracted = temp.path().join("extracted");
            let install = temp.path().join("install");
            std::fs::create_dir_all(&install).unwrap();
            write(&install.join("local-only"), "mine");
            for (path, installed) in RELEASE_FILES.iter().zip(&installed_mask) {
                write(&extracted.join(path), &format!("release {path}"));
                if *installed {
                    write(&install.join(path), &format!("user {path}"));
                }
            }

            let engine = ApplyEngine::new(matcher.clone(), ".updraft");
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let report = runtime
                .block_on(engine.apply(&extracted, &install, &CancellationToken::new()))
                .unwrap();

            for (path, installed) in RELEASE_FILES.iter().zip(&installed_mask) {
                let content = std::fs::read_to_string(install.join(path)).unwrap();
                if *installed && matcher.is_match(Path::new(path)) {
                    prop_assert_eq!(content, format!("user {path}"));
                } else {
                    prop_assert_eq!(content, format!("release {path}"));
                }
            }
            prop_assert_eq!(std::fs::read_to_string(install.join("local-only")).unwrap(), "mine");
            prop_assert_eq!(report.copied.len() + report.preserved.len(), RELEASE_FILES.len());
        }
    }
}
