//! Update server client
//!
//! [`UpdateClient`] talks to the update server and drives the engine for callers
//! that want the whole flow in one call:
//!
//! ```text
//! check_for_updates ─→ VersionResolver ─→ download_version ─→ ChecksumVerifier ─→ UpdateOrchestrator
//! ```
//!
//! # Server Protocol
//!
//! - `GET {server_url}/api/v1/public/versions/check?platform=&arch=&currentVersion=`
//!   with the credential in the `X-API-Key` header
//! - Responses are wrapped as `{"code": 200, "message": "...", "data": {...}}`; any
//!   `code` other than 200, or a missing `data`, is an [`UpdateError::ApiError`]
//! - Download URLs are absolute, or relative to `server_url`
//!
//! # Examples
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use updraft::client::UpdateClient;
//! use updraft::config::{UpdaterConfig, UpdaterSettings};
//! use updraft::upgrade::UpdateOrchestrator;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::new(UpdaterSettings::new("https://updates.example.com", "key"))?;
//! let client = UpdateClient::new(config.clone())?;
//! let mut orchestrator = UpdateOrchestrator::open(&config, "/opt/myapp").await?;
//!
//! if let Some(report) = client
//!     .update_to_recommended("1.0.0", &mut orchestrator, None, &CancellationToken::new())
//!     .await?
//! {
//!     println!("updated to {}", report.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod http;

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::models::{ApiEnvelope, ProgressCallback, UpdatesInfo, VersionInfo};
use crate::resolver::VersionResolver;
use crate::upgrade::{ChecksumVerifier, UpdateOrchestrator, UpdateReport};
use crate::utils::fs::TempDir;

pub use http::{API_KEY_HEADER, HttpTransport, Transport};

/// Path of the version check endpoint.
pub const CHECK_ENDPOINT: &str = "/api/v1/public/versions/check";

/// File name of a downloaded artifact inside the install scratch directory.
const ARTIFACT_FILE: &str = "artifact.tar.gz";

/// Application status code of a successful response.
const API_OK: i64 = 200;

/// Client for the update server.
pub struct UpdateClient {
    config: UpdaterConfig,
    transport: Arc<dyn Transport>,
}

impl UpdateClient {
    /// A client using [`HttpTransport`] with the configured timeout.
    pub fn new(config: UpdaterConfig) -> Result<Self, UpdateError> {
        let transport = HttpTransport::new(config.timeout())
            .map_err(|e| UpdateError::invalid_config(format!("{e:#}")))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// A client using a caller-supplied transport.
    pub fn with_transport(config: UpdaterConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// A resolver over `info` using the configured skip list.
    #[must_use]
    pub fn resolver<'a>(&'a self, info: &'a UpdatesInfo) -> VersionResolver<'a> {
        VersionResolver::new(info, self.config.skip_versions())
    }

    fn check_url(&self, current_version: &str) -> Result<String, UpdateError> {
        let base = format!("{}{}", self.config.server_url(), CHECK_ENDPOINT);
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("platform", self.config.platform().as_str()),
                ("arch", self.config.arch().as_str()),
                ("currentVersion", current_version),
            ],
        )
        .map_err(|e| UpdateError::CheckFailed {
            source: anyhow::Error::new(e).context(format!("Invalid server URL: {base}")),
        })?;
        Ok(url.into())
    }

    /// Absolute download URL of `version`.
    #[must_use]
    pub fn download_url(&self, version: &VersionInfo) -> String {
        let url = version.download_url.as_str();
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.config.server_url(), url.trim_start_matches('/'))
        }
    }

    /// Asks the server which versions are available for this platform.
    pub async fn check_for_updates(&self, current_version: &str) -> Result<UpdatesInfo, UpdateError> {
        let url = self.check_url(current_version)?;
        let body = self
            .transport
            .get_json(&url, self.config.api_key())
            .await
            .map_err(|e| UpdateError::CheckFailed {
                source: e,
            })?;

        let envelope: ApiEnvelope<UpdatesInfo> =
            serde_json::from_value(body).map_err(|e| UpdateError::CheckFailed {
                source: anyhow::Error::new(e).context("Failed to decode version check response"),
            })?;

        if envelope.code != API_OK {
            return Err(UpdateError::ApiError {
                code: envelope.code,
                message: envelope.message,
            });
        }

        let info = envelope.data.ok_or_else(|| UpdateError::ApiError {
            code: envelope.code,
            message: "No update data returned".to_string(),
        })?;

        debug!(
            "Version check: has_update={} latest={} ({} versions)",
            info.has_update,
            info.latest_version,
            info.available_versions.len()
        );
        Ok(info)
    }

    /// The version the installation should move to, if any.
    pub async fn recommended_update(&self, current_version: &str) -> Result<Option<VersionInfo>, UpdateError> {
        let info = self.check_for_updates(current_version).await?;
        let resolver = self.resolver(&info);
        if !resolver.has_update() {
            return Ok(None);
        }
        Ok(resolver.recommended().cloned())
    }

    /// The mandatory version, if the server enforces one.
    pub async fn forced_update(&self, current_version: &str) -> Result<Option<VersionInfo>, UpdateError> {
        let info = self.check_for_updates(current_version).await?;
        Ok(self.resolver(&info).forced_update().cloned())
    }

    /// Downloads `version` to `dest` and verifies its size and hash.
    ///
    /// A file that fails verification is deleted.
    pub async fn download_version(
        &self,
        version: &VersionInfo,
        dest: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        let url = self.download_url(version);
        if version.download_url.is_empty() {
            return Err(UpdateError::DownloadFailed {
                url,
                source: anyhow::anyhow!("Download URL is empty for version {}", version.version),
            });
        }
        if !version.is_downloadable {
            warn!(
                "Version {} is marked as not downloadable{}",
                version.version,
                version.downloadable_status.as_deref().map(|s| format!(": {s}")).unwrap_or_default()
            );
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| UpdateError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e.into(),
            })?;
        }

        info!("Downloading version {} from {}", version.version, url);
        if let Err(e) = self
            .transport
            .download(&url, self.config.api_key(), dest, version.file_size, progress, cancel)
            .await
        {
            if let Err(cleanup) = tokio::fs::remove_file(dest).await {
                debug!("No partial download to remove at {:?}: {}", dest, cleanup);
            }
            if matches!(e.downcast_ref::<UpdateError>(), Some(UpdateError::Cancelled)) {
                return Err(UpdateError::Cancelled);
            }
            return Err(UpdateError::DownloadFailed {
                url,
                source: e,
            });
        }

        if let Err(e) = ChecksumVerifier::verify_artifact(dest, version.file_size, &version.file_hash).await {
            if let Err(cleanup) = tokio::fs::remove_file(dest).await {
                warn!("Failed to remove unverified download {:?}: {}", dest, cleanup);
            }
            return Err(UpdateError::VerifyFailed {
                path: dest.to_path_buf(),
                source: e,
            });
        }

        Ok(())
    }

    /// Downloads the recommended version from an earlier check result.
    ///
    /// Fails with [`UpdateError::NoUpdateAvailable`] when the result reports no update.
    pub async fn download_latest(
        &self,
        info: &UpdatesInfo,
        dest: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<VersionInfo, UpdateError> {
        let resolver = self.resolver(info);
        let version = resolver
            .recommended()
            .filter(|_| resolver.has_update())
            .cloned()
            .ok_or(UpdateError::NoUpdateAvailable)?;
        self.download_version(&version, dest, progress, cancel).await?;
        Ok(version)
    }

    /// Downloads, verifies and installs `version` through `orchestrator`.
    ///
    /// The artifact is saved under a fixed name in a private scratch directory; the
    /// server's version id never becomes part of a path.
    pub async fn install(
        &self,
        version: &VersionInfo,
        orchestrator: &mut UpdateOrchestrator,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<UpdateReport, UpdateError> {
        let scratch = TempDir::new("download").map_err(|e| UpdateError::CreateDirFailed {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let artifact = scratch.path().join(ARTIFACT_FILE);

        self.download_version(version, &artifact, progress, cancel).await?;
        orchestrator.update(version, &artifact, cancel).await
    }

    /// Installs a specific version after checking it is listed and not skipped.
    pub async fn update_to_version(
        &self,
        target_version: &str,
        current_version: &str,
        orchestrator: &mut UpdateOrchestrator,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<UpdateReport, UpdateError> {
        let info = self.check_for_updates(current_version).await?;
        let version = self.resolver(&info).resolve_target(target_version)?.clone();
        self.install(&version, orchestrator, progress, cancel).await
    }

    /// Installs the recommended version, if there is one.
    pub async fn update_to_recommended(
        &self,
        current_version: &str,
        orchestrator: &mut UpdateOrchestrator,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<Option<UpdateReport>, UpdateError> {
        let Some(version) = self.recommended_update(current_version).await? else {
            info!("No update available for version {}", current_version);
            return Ok(None);
        };
        self.install(&version, orchestrator, progress, cancel).await.map(Some)
    }
}
