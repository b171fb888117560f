//! Utility modules for updraft
//!
//! - [`fs`] - directory creation, atomic writes, permission-preserving copies and
//!   self-cleaning scratch directories
//! - [`platform`] - the recognized `platform × arch` set and host detection
//! - [`progress`] - `indicatif` progress bars for the command-line driver

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{TempDir, atomic_write, copy_file_with_permissions, ensure_dir};
pub use platform::{Arch, Platform, is_windows};
pub use progress::{ProgressBar, ProgressStyle};
