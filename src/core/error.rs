//! Error handling for updraft
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`UpdateError`]) so callers can tell a retryable
//!    network hiccup from a failed-and-reverted update or a double failure.
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions for
//!    the command-line driver.
//!
//! # Error Categories
//!
//! | Kind | Meaning | Retryable |
//! |---|---|---|
//! | `InvalidConfig` | configuration rejected at construction | no |
//! | `CheckFailed` / `ApiError` | version check did not complete | yes |
//! | `DownloadFailed` / `VerifyFailed` | transport or integrity problem | after re-download |
//! | `CreateDirFailed` / `BackupFailed` / `ExtractFailed` | environment problem, live tree untouched | after fixing the environment |
//! | `UpdateFailed` | apply failed, rollback succeeded | yes |
//! | `UpdateAndRollbackFailed` | apply and rollback both failed | no, operator required |
//! | `VersionNotFound` / `VersionSkipped` | invalid target requested | no |
//! | `BackupNotFound` / `RollbackFailed` | explicit rollback cannot be satisfied | no |
//!
//! Errors carry their cause as a `#[source]` so `std::error::Error::source()` walks the
//! whole chain instead of flattening it into one string.
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft::core::{ErrorKind, UpdateError};
//!
//! fn report(err: &UpdateError) {
//!     match err.kind() {
//!         ErrorKind::UpdateFailed => eprintln!("update reverted: {err}"),
//!         ErrorKind::UpdateAndRollbackFailed => eprintln!("manual recovery needed: {err}"),
//!         kind if kind.is_retryable() => eprintln!("try again later: {err}"),
//!         _ => eprintln!("{err}"),
//!     }
//! }
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for update operations.
///
/// Every public engine operation returns `Result<T, UpdateError>`. Variants map
/// one-to-one onto [`ErrorKind`]; use [`UpdateError::kind`] when only the category
/// matters.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Configuration failed validation at construction time.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },

    /// The version check request could not be completed.
    #[error("Failed to check for updates")]
    CheckFailed {
        /// Transport or decoding failure
        #[source]
        source: anyhow::Error,
    },

    /// The update server answered with an application-level error.
    #[error("Update server error ({code}): {message}")]
    ApiError {
        /// Application status code from the response envelope
        code: i64,
        /// Message reported by the server
        message: String,
    },

    /// The server reports no update but a download was requested.
    #[error("No update available")]
    NoUpdateAvailable,

    /// Downloading the release artifact failed.
    #[error("Failed to download update from {url}")]
    DownloadFailed {
        /// Download location
        url: String,
        /// Transport failure
        #[source]
        source: anyhow::Error,
    },

    /// The downloaded artifact does not match its published size or hash.
    #[error("File verification failed for {path}")]
    VerifyFailed {
        /// Artifact that failed verification
        path: PathBuf,
        /// Mismatch details
        #[source]
        source: anyhow::Error,
    },

    /// A working directory could not be created.
    #[error("Failed to create directory {path}")]
    CreateDirFailed {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// Snapshotting the installation failed; nothing was modified.
    #[error("Failed to create backup")]
    BackupFailed {
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// Unpacking the downloaded archive failed; nothing was modified.
    #[error("Failed to extract update file")]
    ExtractFailed {
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// Applying the update failed and the installation was restored from backup.
    #[error("Update failed, rolled back successfully")]
    UpdateFailed {
        /// Why the apply step failed
        #[source]
        source: anyhow::Error,
    },

    /// Applying the update failed and restoring the backup failed too.
    #[error("Update failed: {update_error}, Rollback also failed: {rollback_error}")]
    UpdateAndRollbackFailed {
        /// Why the apply step failed
        update_error: String,
        /// Why the restore failed
        rollback_error: String,
    },

    /// The requested version is not among the available versions.
    #[error("Version {version} not found")]
    VersionNotFound {
        /// Requested version identifier
        version: String,
    },

    /// The requested version is on the configured skip list.
    #[error("Version {version} is in skip list")]
    VersionSkipped {
        /// Requested version identifier
        version: String,
    },

    /// No ledger entry exists for the requested rollback version.
    #[error("Backup for version {version} not found")]
    BackupNotFound {
        /// Requested version identifier
        version: String,
    },

    /// Restoring a backup failed.
    #[error("Failed to rollback")]
    RollbackFailed {
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// The operation was cancelled before any live file was modified.
    #[error("Update cancelled")]
    Cancelled,
}

/// Category of an [`UpdateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`UpdateError::InvalidConfig`]
    InvalidConfig,
    /// See [`UpdateError::CheckFailed`]
    CheckFailed,
    /// See [`UpdateError::ApiError`]
    ApiError,
    /// See [`UpdateError::NoUpdateAvailable`]
    NoUpdateAvailable,
    /// See [`UpdateError::DownloadFailed`]
    DownloadFailed,
    /// See [`UpdateError::VerifyFailed`]
    VerifyFailed,
    /// See [`UpdateError::CreateDirFailed`]
    CreateDirFailed,
    /// See [`UpdateError::BackupFailed`]
    BackupFailed,
    /// See [`UpdateError::ExtractFailed`]
    ExtractFailed,
    /// See [`UpdateError::UpdateFailed`]
    UpdateFailed,
    /// See [`UpdateError::UpdateAndRollbackFailed`]
    UpdateAndRollbackFailed,
    /// See [`UpdateError::VersionNotFound`]
    VersionNotFound,
    /// See [`UpdateError::VersionSkipped`]
    VersionSkipped,
    /// See [`UpdateError::BackupNotFound`]
    BackupNotFound,
    /// See [`UpdateError::RollbackFailed`]
    RollbackFailed,
    /// See [`UpdateError::Cancelled`]
    Cancelled,
}

impl ErrorKind {
    /// Stable machine-readable code, e.g. `"BACKUP_FAILED"`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::CheckFailed => "CHECK_FAILED",
            Self::ApiError => "API_ERROR",
            Self::NoUpdateAvailable => "NO_UPDATE_AVAILABLE",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::VerifyFailed => "VERIFY_FAILED",
            Self::CreateDirFailed => "CREATE_DIR_FAILED",
            Self::BackupFailed => "BACKUP_FAILED",
            Self::ExtractFailed => "EXTRACT_FAILED",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateAndRollbackFailed => "UPDATE_AND_ROLLBACK_FAILED",
            Self::VersionNotFound => "VERSION_NOT_FOUND",
            Self::VersionSkipped => "VERSION_SKIPPED",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether repeating the same request can reasonably succeed.
    ///
    /// Environment failures count as retryable: the caller is expected to fix the
    /// environment (free disk space, permissions) and try again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CheckFailed
                | Self::ApiError
                | Self::DownloadFailed
                | Self::VerifyFailed
                | Self::CreateDirFailed
                | Self::BackupFailed
                | Self::ExtractFailed
                | Self::UpdateFailed
                | Self::Cancelled
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl UpdateError {
    /// The category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::CheckFailed { .. } => ErrorKind::CheckFailed,
            Self::ApiError { .. } => ErrorKind::ApiError,
            Self::NoUpdateAvailable => ErrorKind::NoUpdateAvailable,
            Self::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Self::VerifyFailed { .. } => ErrorKind::VerifyFailed,
            Self::CreateDirFailed { .. } => ErrorKind::CreateDirFailed,
            Self::BackupFailed { .. } => ErrorKind::BackupFailed,
            Self::ExtractFailed { .. } => ErrorKind::ExtractFailed,
            Self::UpdateFailed { .. } => ErrorKind::UpdateFailed,
            Self::UpdateAndRollbackFailed { .. } => ErrorKind::UpdateAndRollbackFailed,
            Self::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            Self::VersionSkipped { .. } => ErrorKind::VersionSkipped,
            Self::BackupNotFound { .. } => ErrorKind::BackupNotFound,
            Self::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for [`UpdateError::InvalidConfig`].
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the live installation may have been modified by the failed operation.
    ///
    /// Only the double-failure case leaves the installation in an unknown state.
    #[must_use]
    pub const fn installation_compromised(&self) -> bool {
        matches!(self, Self::UpdateAndRollbackFailed { .. })
    }
}

/// Error wrapper that adds user-facing details and a suggestion.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft::core::{ErrorContext, UpdateError};
///
/// let context = ErrorContext::new(UpdateError::Cancelled)
///     .with_suggestion("Run the update again")
///     .with_details("The update was interrupted before any file was changed");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub message: String,
    /// Category, when the error originated in the engine
    pub kind: Option<ErrorKind>,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context from an [`UpdateError`] with no suggestion or details.
    #[must_use]
    pub fn new(error: UpdateError) -> Self {
        Self {
            message: render_chain(&error),
            kind: Some(error.kind()),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Render an error followed by its `source()` chain.
fn render_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut causes = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }

    if !causes.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in causes.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }
    message
}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
///
/// [`UpdateError`] values get kind-specific guidance; I/O errors get filesystem
/// guidance; anything else is shown with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let error = match error.downcast::<UpdateError>() {
        Ok(update_error) => return create_error_context(update_error),
        Err(other) => other,
    };

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let suggestion = match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => Some(
                "Check ownership of the installation directory or run with elevated permissions",
            ),
            std::io::ErrorKind::NotFound => {
                Some("Check that the file or directory exists and the path is correct")
            }
            _ => None,
        };
        if let Some(suggestion) = suggestion {
            return ErrorContext {
                message: error.to_string(),
                kind: None,
                suggestion: Some(suggestion.to_string()),
                details: None,
            };
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext {
            message: format!("Invalid configuration file: {toml_error}"),
            kind: Some(ErrorKind::InvalidConfig),
            suggestion: Some(
                "Check the TOML syntax in your updraft.toml file. Verify quotes and brackets"
                    .to_string(),
            ),
            details: None,
        };
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext {
        message,
        kind: None,
        suggestion: None,
        details: None,
    }
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::InvalidConfig { .. } => ErrorContext::new(error)
            .with_suggestion("Fix the configuration file and try again. Required: server_url, api_key")
            .with_details("Platform must be one of windows, linux, macos; arch one of amd64, arm64; update_mode one of auto, manual, prompt"),

        UpdateError::CheckFailed { .. } | UpdateError::ApiError { .. } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and the server_url/api_key settings, then retry")
            .with_details("The version check is read-only; nothing on disk was changed"),

        UpdateError::DownloadFailed { .. } | UpdateError::VerifyFailed { .. } => {
            ErrorContext::new(error)
                .with_suggestion("Retry the update to download the release again")
                .with_details("The downloaded file was discarded; the installation was not modified")
        }

        UpdateError::CreateDirFailed { .. }
        | UpdateError::BackupFailed { .. }
        | UpdateError::ExtractFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Check free disk space and write permissions for the installation directory")
            .with_details("The update stopped before any installed file was touched"),

        UpdateError::UpdateFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Retry the update; if it keeps failing, check permissions on the installed files")
            .with_details("The previous installation was restored from backup"),

        UpdateError::UpdateAndRollbackFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Restore the installation manually from the newest archive under the backups directory")
            .with_details("Both the update and the automatic rollback failed. The installation may be incomplete"),

        UpdateError::VersionNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'updraft check' to list the versions available for this platform"),

        UpdateError::VersionSkipped { .. } => ErrorContext::new(error)
            .with_suggestion("Remove the version from skip_versions in the configuration to install it"),

        UpdateError::BackupNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'updraft history' to see which versions have backups"),

        UpdateError::RollbackFailed { .. } => ErrorContext::new(error)
            .with_details("The backup archive is missing or unreadable"),

        UpdateError::NoUpdateAvailable | UpdateError::Cancelled => ErrorContext::new(error),
    }
}
