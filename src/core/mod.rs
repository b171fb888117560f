//! Core types for updraft
//!
//! This module holds the error system shared by every other module:
//! - [`UpdateError`] - one variant per failure mode of the update engine
//! - [`ErrorKind`] - the category of an error, with stable codes and retry guidance
//! - [`ErrorContext`] - user-facing wrapper with details and a suggestion
//! - [`user_friendly_error`] - convert any `anyhow::Error` into an [`ErrorContext`]
//!
//! # Conventions
//!
//! Internal helpers return `anyhow::Result` and attach `.context(...)` describing the
//! file or step involved. Public engine operations convert at their boundary into
//! [`UpdateError`], keeping the `anyhow` chain as the variant's `#[source]`.

pub mod error;

pub use error::{ErrorContext, ErrorKind, UpdateError, user_friendly_error};

/// Result alias for public engine operations.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;
