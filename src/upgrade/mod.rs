//! The update-application engine.
//!
//! This module turns a downloaded, verified release archive into a live installation
//! and can put the previous installation back when something goes wrong.
//!
//! # Architecture Overview
//!
//! - **[`ChecksumVerifier`]**: checks a downloaded artifact's size and MD5 or SHA-256 hash
//! - **[`BackupManager`]**: snapshots the installation directory and restores it
//! - **[`ApplyEngine`]**: merges an extracted release into the installation,
//!   honouring preserve patterns
//! - **[`HistoryLedger`]**: ordered record of update attempts and the snapshots
//!   they own
//! - **[`UpdateOrchestrator`]**: the state machine sequencing the components above
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Backup
//!    └── Archive <install>/ (minus the state dir) to <state>/backups/backup_<ts>.tar.gz
//!
//! 2. Extract
//!    └── Unpack the release into a scratch dir (always removed afterwards)
//!
//! 3. Apply
//!    ├── Copy every release file over the installation
//!    └── Skip preserved files that already exist
//!
//! 4. Finish
//!    ├── success: record `success`, prune snapshots beyond backup_count
//!    └── failure: restore the snapshot, record `rolled_back` (or `failed` if the
//!        restore failed too)
//! ```
//!
//! # State Directory
//!
//! Everything the engine writes lives under `<install_dir>/<state_dir>/`
//! (`.updraft/` by default):
//!
//! ```text
//! .updraft/
//! ├── backups/backup_20240501_120000_123.tar.gz
//! ├── history.json
//! └── updraft_extract_<uuid>/      (only while an update runs)
//! ```
//!
//! The state directory is excluded from snapshots, from apply and from restore.
//!
//! # Example
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use updraft::config::{UpdaterConfig, UpdaterSettings};
//! use updraft::core::UpdateError;
//! use updraft::models::VersionInfo;
//! use updraft::upgrade::UpdateOrchestrator;
//! use std::path::Path;
//!
//! # async fn example(release: VersionInfo) -> anyhow::Result<()> {
//! let config = UpdaterConfig::new(UpdaterSettings::new("https://updates.example.com", "key"))?;
//! let mut orchestrator = UpdateOrchestrator::open(&config, "/opt/myapp").await?;
//!
//! match orchestrator.update(&release, Path::new("/tmp/release.tar.gz"), &CancellationToken::new()).await {
//!     Ok(report) => println!("now on {}", report.version),
//!     Err(e @ UpdateError::UpdateFailed { .. }) => eprintln!("reverted: {e}"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

/// Merging an extracted release into the installation directory.
pub mod apply;
/// Installation snapshots: create, restore and prune.
pub mod backup;
/// The ordered, optionally persistent record of update attempts.
pub mod history;
/// The update state machine and standalone rollback.
pub mod orchestrator;
/// Download verification and integrity checking.
pub mod verification;


pub use apply::{ApplyEngine, ApplyProgress, ApplyProgressCallback, ApplyReport};
pub use backup::BackupManager;
pub use history::HistoryLedger;
pub use orchestrator::{UpdateOrchestrator, UpdateReport, UpdateState};
pub use verification::{ChecksumVerifier, HashAlgorithm};
