//! Shared plumbing for CLI commands

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{UpdaterConfig, UpdaterSettings};
use crate::models::{DownloadProgress, ProgressCallback};
use crate::upgrade::{HistoryLedger, UpdateOrchestrator};
use crate::utils::ProgressBar;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Settings file (`updraft.toml`)
    pub config_path: PathBuf,
    /// Installation root
    pub install_dir: PathBuf,
    /// Credential override from `--api-key` / `UPDRAFT_API_KEY`
    pub api_key: Option<String>,
    /// Draw no progress bars
    pub no_progress: bool,
}

impl CommandContext {
    /// Reads the settings file and applies the credential override.
    pub async fn load_settings(&self) -> Result<UpdaterSettings> {
        let mut settings = UpdaterSettings::load(&self.config_path).await?;
        if let Some(key) = &self.api_key {
            settings.api_key.clone_from(key);
        }
        Ok(settings)
    }

    /// Like [`load_settings`](Self::load_settings), but a missing settings file
    /// yields the defaults. For commands that never talk to the server.
    pub async fn load_settings_or_default(&self) -> Result<UpdaterSettings> {
        if !self.config_path.exists() {
            debug!("No settings file at {:?}, using defaults", self.config_path);
            return Ok(UpdaterSettings::default());
        }
        self.load_settings().await
    }

    /// The validated configuration.
    pub async fn load_config(&self) -> Result<UpdaterConfig> {
        let settings = self.load_settings().await?;
        Ok(UpdaterConfig::new(settings)?)
    }

    /// An orchestrator over the installation with its persistent ledger.
    pub async fn orchestrator(&self, config: &UpdaterConfig) -> Result<UpdateOrchestrator> {
        if !self.install_dir.is_dir() {
            bail!("Installation directory does not exist: {}", self.install_dir.display());
        }
        UpdateOrchestrator::open(config, &self.install_dir).await
    }

    /// The persistent ledger, for read-only commands.
    pub async fn ledger(&self, state_dir: &str) -> Result<HistoryLedger> {
        let path = self.install_dir.join(state_dir).join(UpdateOrchestrator::HISTORY_FILE);
        HistoryLedger::open(path).await
    }

    /// A download bar, hidden under `--no-progress`.
    #[must_use]
    pub fn download_bar(&self, total: u64) -> ProgressBar {
        if self.no_progress {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_download(total)
        }
    }
}

/// The installed version: `explicit` when given, else the latest successful
/// update in the ledger.
pub fn current_version(explicit: Option<&str>, ledger: &HistoryLedger) -> Result<String> {
    if let Some(version) = explicit {
        return Ok(version.to_string());
    }
    ledger.latest_success().map(|r| r.version.clone()).context(
        "Current version is unknown: no successful update is recorded. Pass --current-version",
    )
}

/// Feeds download progress into `bar`.
#[must_use]
pub fn download_progress(bar: &ProgressBar) -> ProgressCallback {
    let bar = bar.clone();
    Arc::new(move |progress: &DownloadProgress| {
        if progress.total > 0 {
            bar.set_length(progress.total);
        }
        bar.set_position(progress.downloaded);
    })
}

/// A token cancelled on Ctrl-C.
#[must_use]
pub fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

/// Asks a yes/no question on the terminal; the default answer is yes.
///
/// Returns `Ok(false)` without prompting when stdin is not a terminal.
pub async fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        eprintln!("{}", "Not a terminal; pass --yes to confirm non-interactively.".yellow());
        return Ok(false);
    }

    print!("{} ", format!("{question} [Y/n]:").green());
    io::stdout().flush()?;

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut response = String::new();
    reader.read_line(&mut response).await?;
    Ok(is_yes(&response))
}

fn is_yes(response: &str) -> bool {
    let response = response.trim().to_lowercase();
    response.is_empty() || response == "y" || response == "yes"
}
