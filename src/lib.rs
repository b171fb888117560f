//! updraft - a self-update engine
//!
//! updraft lets an application discover, fetch and apply new releases of itself on a
//! single host, and recover when an upgrade goes wrong.
//!
//! # Architecture Overview
//!
//! ```text
//! UpdateClient ──check──→ update server
//!      │
//!      ├── VersionResolver   which version to install (forced floor, skip list)
//!      ├── Transport         authenticated download with progress
//!      ├── ChecksumVerifier  size + MD5/SHA-256
//!      └── UpdateOrchestrator
//!             ├── BackupManager  snapshot / restore / prune
//!             ├── ApplyEngine    merge release into the installation
//!             └── HistoryLedger  ordered record of attempts and their snapshots
//! ```
//!
//! # Core Modules
//!
//! - [`config`] - Settings file and the validated [`config::UpdaterConfig`]
//! - [`core`] - Error taxonomy and user-facing error rendering
//! - [`models`] - Server payloads, history records, progress values
//! - [`resolver`] - Version selection
//! - [`pattern`] - Preserve-file matching
//! - [`archive`] - tar+gzip packing and safe unpacking
//! - [`upgrade`] - The update-application engine
//! - [`client`] - Update server client
//! - [`cli`] - The `updraft` binary's commands
//! - [`utils`] - Filesystem, platform and progress helpers
//!
//! # Safety Guarantees
//!
//! - A snapshot of the installation is taken before anything is changed
//! - Files matching a preserve pattern are never overwritten once present
//! - An apply failure always restores the snapshot, and the error says whether the
//!   restore worked
//! - At most `backup_count` snapshots are kept; each one belongs to exactly one
//!   history record
//!
//! # Example
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use updraft::client::UpdateClient;
//! use updraft::config::{UpdaterConfig, UpdaterSettings};
//! use updraft::upgrade::UpdateOrchestrator;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = UpdaterSettings::load("updraft.toml".as_ref()).await?;
//! let config = UpdaterConfig::new(settings)?;
//! let client = UpdateClient::new(config.clone())?;
//! let mut orchestrator = UpdateOrchestrator::open(&config, "/opt/myapp").await?;
//!
//! client
//!     .update_to_version("2.1.0", "2.0.0", &mut orchestrator, None, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod models;
pub mod pattern;
pub mod resolver;
pub mod upgrade;
pub mod utils;
