//! Configuration for the update engine
//!
//! Configuration comes in two layers:
//!
//! 1. [`UpdaterSettings`] - the raw, serde-deserializable shape read from `updraft.toml`.
//!    Every field has a default, so a file only needs the values it changes.
//! 2. [`UpdaterConfig`] - the validated, immutable value the engine runs with. The only
//!    way to obtain one is [`UpdaterConfig::new`], so the engine never runs with an
//!    unvalidated configuration.
//!
//! # Configuration File
//!
//! ```toml
//! server_url = "https://updates.example.com"
//! api_key = "secret"
//! # platform / arch default to the host
//! platform = "linux"
//! arch = "amd64"
//! timeout_secs = 30
//! preserve_files = ["config.yaml", "config.yml", "*.conf"]
//! backup_count = 3
//! update_mode = "auto"          # auto | manual | prompt
//! skip_versions = ["1.4.0"]
//! preserve_match = "loose"      # loose | glob
//! state_dir = ".updraft"
//! ```
//!
//! # Validation Rules
//!
//! | Field | Rule |
//! |---|---|
//! | `server_url`, `api_key` | non-empty |
//! | `platform` | one of `windows`, `linux`, `macos` (host when omitted) |
//! | `arch` | one of `amd64`, `arm64` (host when omitted) |
//! | `update_mode` | one of `auto`, `manual`, `prompt` |
//! | `backup_count` | at least 1 |
//! | `timeout_secs` | greater than 0 |
//! | `preserve_files` | valid glob syntax |
//! | `preserve_match` | `loose` or `glob` |
//! | `state_dir` | a single relative path component |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use std::time::Duration;

use crate::core::UpdateError;
use crate::pattern::{PreserveMatch, PreserveMatcher};
use crate::utils::platform::{Arch, Platform};

fn default_timeout_secs() -> u64 {
    30
}

fn default_preserve_files() -> Vec<String> {
    vec!["config.yaml".to_string(), "config.yml".to_string(), "*.conf".to_string()]
}

fn default_backup_count() -> usize {
    3
}

fn default_update_mode() -> String {
    UpdateMode::Auto.as_str().to_string()
}

fn default_preserve_match() -> String {
    PreserveMatch::Loose.as_str().to_string()
}

fn default_state_dir() -> String {
    ".updraft".to_string()
}

/// How the driver chooses and confirms an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Install the recommended version without asking.
    #[default]
    Auto,
    /// Install only an explicitly requested version.
    Manual,
    /// Show the candidate and ask before installing.
    Prompt,
}

impl UpdateMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "prompt" => Ok(Self::Prompt),
            other => Err(format!("unknown update mode '{other}' (expected auto, manual or prompt)")),
        }
    }
}

/// Raw configuration as read from a TOML file.
///
/// Values are not checked here; pass the settings to [`UpdaterConfig::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterSettings {
    /// Base URL of the update server.
    #[serde(default)]
    pub server_url: String,

    /// Credential sent with every request.
    #[serde(default)]
    pub api_key: String,

    /// Target platform; the host platform when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Target architecture; the host architecture when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Paths (relative to the installation root) never overwritten once present.
    #[serde(default = "default_preserve_files")]
    pub preserve_files: Vec<String>,

    /// Number of backups kept after pruning.
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,

    /// `auto`, `manual` or `prompt`.
    #[serde(default = "default_update_mode")]
    pub update_mode: String,

    /// Version identifiers that are never installed.
    #[serde(default)]
    pub skip_versions: Vec<String>,

    /// `loose` (glob or substring) or `glob`.
    #[serde(default = "default_preserve_match")]
    pub preserve_match: String,

    /// Directory under the installation root holding backups and the history ledger.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_key: String::new(),
            platform: None,
            arch: None,
            timeout_secs: default_timeout_secs(),
            preserve_files: default_preserve_files(),
            backup_count: default_backup_count(),
            update_mode: default_update_mode(),
            skip_versions: Vec::new(),
            preserve_match: default_preserve_match(),
            state_dir: default_state_dir(),
        }
    }
}

impl UpdaterSettings {
    /// Settings with the given endpoint and credential and defaults elsewhere.
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Reads settings from a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Parses settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Validated engine configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft::config::{UpdaterConfig, UpdaterSettings};
///
/// let mut settings = UpdaterSettings::new("https://updates.example.com", "secret");
/// settings.platform = Some("linux".into());
/// settings.arch = Some("amd64".into());
/// let config = UpdaterConfig::new(settings)?;
/// assert_eq!(config.backup_count(), 3);
/// # Ok::<(), updraft::core::UpdateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    server_url: String,
    api_key: String,
    platform: Platform,
    arch: Arch,
    timeout: Duration,
    preserve_files: Vec<String>,
    preserve_match: PreserveMatch,
    backup_count: usize,
    update_mode: UpdateMode,
    skip_versions: HashSet<String>,
    state_dir: String,
}

impl UpdaterConfig {
    /// Validates `settings`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::InvalidConfig`] naming the first rule that failed.
    pub fn new(settings: UpdaterSettings) -> Result<Self, UpdateError> {
        let server_url = settings.server_url.trim().trim_end_matches('/').to_string();
        if server_url.is_empty() {
            return Err(UpdateError::invalid_config("server_url is required"));
        }
        if settings.api_key.trim().is_empty() {
            return Err(UpdateError::invalid_config("api_key is required"));
        }

        let platform = match settings.platform.as_deref() {
            Some(p) => p.parse::<Platform>().map_err(UpdateError::invalid_config)?,
            None => Platform::detect().ok_or_else(|| {
                UpdateError::invalid_config(format!(
                    "host platform '{}' is not supported; set platform explicitly",
                    std::env::consts::OS
                ))
            })?,
        };
        let arch = match settings.arch.as_deref() {
            Some(a) => a.parse::<Arch>().map_err(UpdateError::invalid_config)?,
            None => Arch::detect().ok_or_else(|| {
                UpdateError::invalid_config(format!(
                    "host arch '{}' is not supported; set arch explicitly",
                    std::env::consts::ARCH
                ))
            })?,
        };

        let update_mode =
            settings.update_mode.parse::<UpdateMode>().map_err(UpdateError::invalid_config)?;
        let preserve_match =
            settings.preserve_match.parse::<PreserveMatch>().map_err(UpdateError::invalid_config)?;

        if settings.backup_count == 0 {
            return Err(UpdateError::invalid_config("backup_count must be at least 1"));
        }
        if settings.timeout_secs == 0 {
            return Err(UpdateError::invalid_config("timeout_secs must be greater than 0"));
        }

        PreserveMatcher::new(&settings.preserve_files, preserve_match)
            .map_err(|e| UpdateError::invalid_config(format!("{e:#}")))?;

        validate_state_dir(&settings.state_dir)?;

        Ok(Self {
            server_url,
            api_key: settings.api_key,
            platform,
            arch,
            timeout: Duration::from_secs(settings.timeout_secs),
            preserve_files: settings.preserve_files,
            preserve_match,
            backup_count: settings.backup_count,
            update_mode,
            skip_versions: settings.skip_versions.into_iter().collect(),
            state_dir: settings.state_dir,
        })
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub const fn arch(&self) -> Arch {
        self.arch
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn preserve_files(&self) -> &[String] {
        &self.preserve_files
    }

    #[must_use]
    pub const fn preserve_match(&self) -> PreserveMatch {
        self.preserve_match
    }

    /// Compiled preserve-pattern set. Patterns were checked during validation.
    #[must_use]
    pub fn preserve_matcher(&self) -> PreserveMatcher {
        PreserveMatcher::new(&self.preserve_files, self.preserve_match)
            .unwrap_or_else(|_| PreserveMatcher::empty())
    }

    #[must_use]
    pub const fn backup_count(&self) -> usize {
        self.backup_count
    }

    #[must_use]
    pub const fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    #[must_use]
    pub fn is_skipped(&self, version: &str) -> bool {
        self.skip_versions.contains(version)
    }

    #[must_use]
    pub const fn skip_versions(&self) -> &HashSet<String> {
        &self.skip_versions
    }

    /// Name of the state directory under the installation root.
    #[must_use]
    pub fn state_dir(&self) -> &str {
        &self.state_dir
    }
}

fn validate_state_dir(state_dir: &str) -> Result<(), UpdateError> {
    let mut components = Path::new(state_dir).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(UpdateError::invalid_config(format!(
            "state_dir must be a single directory name, got '{state_dir}'"
        ))),
    }
}
