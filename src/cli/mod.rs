//! Command-line interface for updraft.
//!
//! The binary drives the update engine against one installation directory. Each
//! subcommand lives in its own module with its own argument struct and an `execute`
//! method taking the shared [`CommandContext`].
//!
//! # Available Commands
//!
//! - `check` - Ask the server which versions are available
//! - `update` - Download and install a version (honours `update_mode`)
//! - `rollback` - Restore the snapshot taken before an earlier update
//! - `history` - Show the update history ledger
//!
//! # Global Options
//!
//! - `--verbose` / `--quiet` - Log level (`debug` / `error`, default `info`;
//!   `RUST_LOG` overrides both)
//! - `--no-progress` - Disable progress bars
//! - `--config` - Settings file (env `UPDRAFT_CONFIG`, default `updraft.toml`)
//! - `--install-dir` - Installation root (default: current directory)
//! - `--api-key` - Credential override (env `UPDRAFT_API_KEY`)
//!
//! # Example
//!
//! ```bash
//! updraft --config /etc/myapp/updraft.toml --install-dir /opt/myapp check --current-version 1.4.0
//! updraft --install-dir /opt/myapp update --yes
//! updraft --install-dir /opt/myapp rollback 2.0.0
//! ```

mod check;
pub mod common;
mod history;
mod rollback;
mod update;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use common::CommandContext;

/// Root command.
#[derive(Parser)]
#[command(
    name = "updraft",
    about = "Self-update engine - check, install and roll back application releases",
    version,
    long_about = "updraft checks an update server for new releases of an application, installs them \
                  with a pre-update snapshot, and rolls back automatically when applying fails."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable progress bars.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Path to the updraft settings file.
    #[arg(short, long, global = true, env = "UPDRAFT_CONFIG", default_value = "updraft.toml")]
    config: PathBuf,

    /// Root directory of the installation to update.
    #[arg(long, global = true, default_value = ".")]
    install_dir: PathBuf,

    /// API key; overrides `api_key` from the settings file.
    #[arg(long, global = true, env = "UPDRAFT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the update server for available versions.
    Check(check::CheckCommand),

    /// Download and install a version.
    Update(update::UpdateCommand),

    /// Restore the snapshot taken before an earlier update.
    Rollback(rollback::RollbackCommand),

    /// Show the update history.
    History(history::HistoryCommand),
}

impl Cli {
    /// Installs the log subscriber and runs the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();
        let context = self.context();

        match self.command {
            Commands::Check(cmd) => cmd.execute(&context).await,
            Commands::Update(cmd) => cmd.execute(&context).await,
            Commands::Rollback(cmd) => cmd.execute(&context).await,
            Commands::History(cmd) => cmd.execute(&context).await,
        }
    }

    /// Log filter for the global flags. `RUST_LOG` wins when set.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.log_level()));
        // A subscriber may already be installed when running inside tests.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// The shared context handed to every subcommand.
    #[must_use]
    pub fn context(&self) -> CommandContext {
        CommandContext {
            config_path: self.config.clone(),
            install_dir: self.install_dir.clone(),
            api_key: self.api_key.clone(),
            no_progress: self.no_progress || self.quiet,
        }
    }
}
