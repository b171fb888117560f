//! Version selection
//!
//! [`VersionResolver`] answers the questions a caller asks of a version check result:
//! is there an update, which version should be installed, is there a forced minimum,
//! and may a specific version be installed. It is a pure view over one
//! [`UpdatesInfo`] payload plus the configured skip list; it performs no I/O.
//!
//! # Rules
//!
//! - Ordering uses `version_weight` only. Version strings are opaque.
//! - `available_versions` is trusted to be newest first.
//! - The server's [`UpdateStrategy`](crate::models::UpdateStrategy) is applied as-is.
//! - A forced minimum takes precedence over "latest" when recommending.
//! - Skip-listed versions are never selected. An explicit request for a skip-listed
//!   version fails with [`UpdateError::VersionSkipped`], even when it is the forced
//!   minimum; the installation then stays below the forced floor and a warning is logged.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::collections::HashSet;
//! use updraft::models::UpdatesInfo;
//! use updraft::resolver::VersionResolver;
//!
//! # fn example(info: UpdatesInfo) -> Result<(), updraft::core::UpdateError> {
//! let skip = HashSet::new();
//! let resolver = VersionResolver::new(&info, &skip);
//! if let Some(forced) = resolver.forced_update() {
//!     println!("must install {}", forced.version);
//! }
//! let target = resolver.resolve_target("2.0.0")?;
//! println!("installing weight {}", target.version_weight);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::core::UpdateError;
use crate::models::{UpdatesInfo, VersionInfo};

/// Read-only selection logic over one version check result.
#[derive(Debug, Clone, Copy)]
pub struct VersionResolver<'a> {
    info: &'a UpdatesInfo,
    skip_versions: &'a HashSet<String>,
}

impl<'a> VersionResolver<'a> {
    #[must_use]
    pub const fn new(info: &'a UpdatesInfo, skip_versions: &'a HashSet<String>) -> Self {
        Self {
            info,
            skip_versions,
        }
    }

    /// True iff the server reports an update and at least one version is listed.
    #[must_use]
    pub fn has_update(&self) -> bool {
        self.info.has_update && !self.info.available_versions.is_empty()
    }

    /// Looks up a version by identifier.
    #[must_use]
    pub fn find(&self, version: &str) -> Option<&'a VersionInfo> {
        self.info.available_versions.iter().find(|v| v.version == version)
    }

    /// Whether `version` is on the skip list.
    #[must_use]
    pub fn is_skipped(&self, version: &str) -> bool {
        self.skip_versions.contains(version)
    }

    /// The forced-minimum entry named by the strategy, regardless of its own flag.
    fn forced_floor(&self) -> Option<&'a VersionInfo> {
        let strategy = &self.info.update_strategy;
        if !strategy.has_forced {
            return None;
        }
        self.find(&strategy.min_required_version)
    }

    /// The version that should be installed, or `None` when nothing is eligible.
    ///
    /// With a forced strategy the forced minimum is returned; otherwise the first
    /// (newest) entry. Skip-listed entries are passed over: the next candidate must
    /// still be at or above the forced floor when one applies.
    #[must_use]
    pub fn recommended(&self) -> Option<&'a VersionInfo> {
        let versions = &self.info.available_versions;

        let Some(floor) = self.forced_floor() else {
            return versions.iter().find(|v| !self.is_skipped(&v.version));
        };

        if !self.is_skipped(&floor.version) {
            return Some(floor);
        }

        warn!(
            "Forced minimum version {} is in the skip list; the installation stays below the forced floor unless another eligible version is installed",
            floor.version
        );
        versions
            .iter()
            .find(|v| !self.is_skipped(&v.version) && v.version_weight >= floor.version_weight)
    }

    /// The forced-minimum entry if the update is genuinely mandatory.
    ///
    /// Requires the strategy to be forced **and** the named entry to carry its own
    /// `is_forced` flag; a strategy pointing at a non-forced entry is not a hard
    /// requirement.
    #[must_use]
    pub fn forced_update(&self) -> Option<&'a VersionInfo> {
        self.forced_floor().filter(|v| v.is_forced)
    }

    /// Validates an explicit request for `version`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::VersionNotFound`] when the version is not listed
    /// - [`UpdateError::VersionSkipped`] when it is on the skip list, even if it is the
    ///   forced minimum
    pub fn resolve_target(&self, version: &str) -> Result<&'a VersionInfo, UpdateError> {
        let Some(target) = self.find(version) else {
            return Err(UpdateError::VersionNotFound {
                version: version.to_string(),
            });
        };

        if self.is_skipped(version) {
            if self.forced_update().is_some_and(|f| f.version == version) {
                warn!("Version {version} is forced by the server but skipped by configuration");
            }
            return Err(UpdateError::VersionSkipped {
                version: version.to_string(),
            });
        }

        debug!("Resolved target version {} (weight {})", target.version, target.version_weight);
        Ok(target)
    }

    /// Listed versions strictly newer than `weight`, newest first.
    pub fn newer_than(&self, weight: i64) -> impl Iterator<Item = &'a VersionInfo> + 'a {
        self.info.available_versions.iter().filter(move |v| v.version_weight > weight)
    }
}
