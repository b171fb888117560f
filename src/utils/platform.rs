//! Platform and architecture identifiers
//!
//! The update server publishes one artifact per `platform × arch` pair. This module
//! defines the recognized set, `{windows, linux, macos} × {amd64, arm64}`, and
//! detects the host's pair from [`std::env::consts`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft::utils::platform::{Arch, Platform};
//!
//! let platform: Platform = "linux".parse().unwrap();
//! assert_eq!(platform.as_str(), "linux");
//!
//! // `None` on hosts outside the recognized set
//! let _host = Platform::detect();
//! let _arch = Arch::detect();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Operating system family an artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Microsoft Windows
    Windows,
    /// Linux distributions
    Linux,
    /// Apple macOS
    Macos,
}

impl Platform {
    /// All recognized platforms.
    pub const ALL: [Self; 3] = [Self::Windows, Self::Linux, Self::Macos];

    /// Wire name used in query strings and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Macos => "macos",
        }
    }

    /// The host platform, or `None` when it is outside the recognized set.
    #[must_use]
    pub fn detect() -> Option<Self> {
        match std::env::consts::OS {
            "windows" => Some(Self::Windows),
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unsupported platform '{s}' (expected windows, linux or macos)"))
    }
}

/// CPU architecture an artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86-64
    Amd64,
    /// AArch64
    Arm64,
}

impl Arch {
    /// All recognized architectures.
    pub const ALL: [Self; 2] = [Self::Amd64, Self::Arm64];

    /// Wire name used in query strings and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    /// The host architecture, or `None` when it is outside the recognized set.
    #[must_use]
    pub fn detect() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Self::Amd64),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unsupported arch '{s}' (expected amd64 or arm64)"))
    }
}

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Normalizes a relative path to forward slashes.
///
/// Preserve patterns are written with `/` separators; relative paths are normalized
/// before matching so the same configuration works on every platform.
///
/// ```rust,no_run
/// use updraft::utils::platform::normalize_path_for_matching;
/// use std::path::Path;
///
/// assert_eq!(normalize_path_for_matching(Path::new("conf\\app.conf")), "conf/app.conf");
/// ```
#[must_use]
pub fn normalize_path_for_matching(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
