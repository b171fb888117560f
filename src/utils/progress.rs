//! Terminal progress indicators for the command-line driver
//!
//! The engine itself only reports progress through callbacks
//! ([`ProgressCallback`](crate::models::ProgressCallback) and
//! [`ApplyProgressCallback`](crate::upgrade::ApplyProgressCallback)); this module turns
//! those callbacks into `indicatif` bars.
//!
//! # Environment Variables
//!
//! - `UPDRAFT_NO_PROGRESS`: Set to any value to hide all progress indicators
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft::utils::progress::ProgressBar;
//!
//! let bar = ProgressBar::new_download(1024);
//! bar.set_message("Downloading 2.0.0");
//! bar.set_position(512);
//! bar.finish_and_clear();
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var("UPDRAFT_NO_PROGRESS").is_ok()
}

/// Cloneable handle to a progress bar, hidden when progress is disabled.
#[derive(Clone, Debug)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A byte-counting bar; `total == 0` means the size is unknown.
    #[must_use]
    pub fn new_download(total: u64) -> Self {
        if total == 0 {
            return Self::new_spinner();
        }
        Self::styled(IndicatifBar::new(total), ProgressStyle::download())
    }

    /// A spinner for work of unknown length.
    #[must_use]
    pub fn new_spinner() -> Self {
        let bar = Self::styled(IndicatifBar::new_spinner(), ProgressStyle::spinner());
        bar.inner.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    /// A bar that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    fn styled(bar: IndicatifBar, style: IndicatifStyle) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }
        bar.set_style(style);
        Self {
            inner: bar,
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn set_length(&self, len: u64) {
        self.inner.set_length(len);
    }

    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Named styles shared by all bars.
pub struct ProgressStyle;

impl ProgressStyle {
    #[must_use]
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template("{msg:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .progress_chars("━╸━")
    }

    #[must_use]
    pub fn spinner() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }
}
