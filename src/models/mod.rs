//! Shared data types
//!
//! This module defines the wire shapes exchanged with the update server and the
//! records the engine keeps about its own work:
//!
//! - [`VersionInfo`], [`VersionStatus`], [`UpdateStrategy`], [`UpdatesInfo`] - the version
//!   check payload (JSON, camelCase field names)
//! - [`ApiEnvelope`] - the `{code, message, data}` wrapper around every response
//! - [`UpdateRecord`], [`UpdateStatus`] - history ledger entries
//! - [`DownloadProgress`], [`ProgressCallback`] - download progress reporting
//!
//! Payload types are immutable once received: the resolver reads them and never
//! recomputes what the server decided (for example the forced minimum).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Release status of a published version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    #[default]
    Published,
    Recalled,
    Archived,
    Scheduled,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl VersionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Recalled => "recalled",
            Self::Archived => "archived",
            Self::Scheduled => "scheduled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One installable release, as published by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionInfo {
    /// Opaque identifier, e.g. `"2.1.0"`.
    pub version: String,
    /// Total order over versions; higher is newer. Never compare `version` strings.
    pub version_weight: i64,
    pub changelog: String,
    pub release_date: String,
    pub download_url: String,
    /// Artifact size in bytes; 0 when unknown.
    pub file_size: u64,
    /// Hex SHA-256 of the artifact, optionally prefixed with `sha256:`.
    pub file_hash: String,
    pub status: VersionStatus,
    pub is_downloadable: bool,
    /// Human-readable reason when the version is not downloadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloadable_status: Option<String>,
    /// Planned release time for `scheduled` versions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_release_at: Option<String>,
    pub is_forced: bool,
}

impl VersionInfo {
    /// Whether this version is strictly newer than `other` by weight.
    #[must_use]
    pub const fn is_newer_than(&self, other: &Self) -> bool {
        self.version_weight > other.version_weight
    }
}

/// Server-computed update policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateStrategy {
    /// Whether a forced minimum applies to this client.
    pub has_forced: bool,
    /// Identifier of the minimum version the client must reach.
    pub min_required_version: String,
}

/// The version check result.
///
/// `available_versions` is ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatesInfo {
    pub has_update: bool,
    pub current_version: String,
    pub latest_version: String,
    pub available_versions: Vec<VersionInfo>,
    pub update_strategy: UpdateStrategy,
}

/// Response wrapper used by every server endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// Outcome of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// The update was applied.
    Success,
    /// The attempt failed; the installation was left as it was or could not be restored.
    Failed,
    /// Applying failed and the installation was restored from the backup.
    RolledBack,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        })
    }
}

/// One history ledger entry.
///
/// `backup_path` is the snapshot taken before the attempt; the entry owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub status: UpdateStatus,
    pub backup_path: PathBuf,
}

impl UpdateRecord {
    /// A record stamped with the current time.
    pub fn now(version: impl Into<String>, status: UpdateStatus, backup_path: PathBuf) -> Self {
        Self {
            version: version.into(),
            timestamp: Utc::now(),
            status,
            backup_path,
        }
    }
}

/// Snapshot of a running download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes received so far; never decreases during one download.
    pub downloaded: u64,
    /// Expected size in bytes; 0 when unknown.
    pub total: u64,
    /// `downloaded / total * 100`, or 0 when the total is unknown.
    pub percentage: f64,
}

impl DownloadProgress {
    #[must_use]
    pub fn new(downloaded: u64, total: u64) -> Self {
        let percentage = if total > 0 {
            (downloaded as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            downloaded,
            total,
            percentage,
        }
    }
}

/// Download progress callback.
///
/// Invoked synchronously on the downloading task; it must return quickly or the
/// download stalls.
pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;
