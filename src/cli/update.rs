//! `updraft update`: download and install a release.
//!
//! The version is chosen by the configured (or `--mode`) update mode:
//!
//! | Mode | Behaviour |
//! |---|---|
//! | `auto` | installs `--version`, or the recommended version |
//! | `manual` | installs `--version`; refuses to pick one itself |
//! | `prompt` | like `auto`, but shows the candidate and asks first unless `--yes` |
//!
//! A failed apply is rolled back automatically; the command then exits non-zero with
//! an error saying whether the rollback succeeded.

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use super::common::{CommandContext, cancel_on_interrupt, confirm, current_version, download_progress};
use crate::client::UpdateClient;
use crate::config::UpdateMode;
use crate::core::UpdateError;
use crate::models::VersionInfo;
use crate::resolver::VersionResolver;
use crate::upgrade::{ApplyProgress, UpdateReport};

/// Arguments for `updraft update`.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Version to install instead of the recommended one.
    #[arg(long = "version", value_name = "VERSION")]
    pub target: Option<String>,

    /// Installed version; defaults to the last successful update in the history.
    #[arg(long, env = "UPDRAFT_CURRENT_VERSION")]
    pub current_version: Option<String>,

    /// Override `update_mode` from the settings file (auto, manual, prompt).
    #[arg(long)]
    pub mode: Option<UpdateMode>,

    /// Answer yes to the confirmation in prompt mode.
    #[arg(short, long)]
    pub yes: bool,
}

impl UpdateCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config().await?;
        let mut orchestrator = ctx.orchestrator(&config).await?;
        let current = current_version(self.current_version.as_deref(), orchestrator.ledger())?;
        let mode = self.mode.unwrap_or(config.update_mode());
        let client = UpdateClient::new(config)?;

        let info = client.check_for_updates(&current).await?;
        let resolver = client.resolver(&info);
        let Some(target) = select_target(&resolver, self.target.as_deref(), mode)? else {
            println!("{} (current version {})", "Already up to date".green(), current.cyan());
            return Ok(());
        };

        if mode == UpdateMode::Prompt && !self.yes {
            describe(&current, &target);
            if !confirm(&format!("Install version {}?", target.version)).await? {
                println!("{}", "Update cancelled.".yellow());
                return Ok(());
            }
        }

        let bar = ctx.download_bar(target.file_size);
        bar.set_message(format!("Downloading {}", target.version));
        let apply_bar = bar.clone();
        orchestrator.set_apply_progress(Some(Arc::new(move |p: &ApplyProgress| {
            apply_bar.set_message(format!("Applying {}/{}", p.applied, p.total));
        })));

        let cancel = cancel_on_interrupt();
        let result = client.install(&target, &mut orchestrator, Some(download_progress(&bar)), &cancel).await;
        bar.finish_and_clear();

        let report = result?;
        print_report(&current, &report);
        Ok(())
    }
}

/// Picks the version to install, or `None` when there is nothing to do.
fn select_target(
    resolver: &VersionResolver<'_>,
    requested: Option<&str>,
    mode: UpdateMode,
) -> Result<Option<VersionInfo>> {
    if let Some(version) = requested {
        return Ok(Some(resolver.resolve_target(version)?.clone()));
    }
    if mode == UpdateMode::Manual {
        bail!("update_mode is 'manual': pass --version to choose the version to install");
    }
    if !resolver.has_update() {
        return Ok(None);
    }
    match resolver.recommended() {
        Some(version) => Ok(Some(version.clone())),
        None => Err(UpdateError::NoUpdateAvailable.into()),
    }
}

fn describe(current: &str, target: &VersionInfo) {
    println!("{} {} → {}", "Update available:".bold(), current.cyan(), target.version.green().bold());
    if target.is_forced {
        println!("{}", "This update is mandatory.".red());
    }
    if !target.release_date.is_empty() {
        println!("Released: {}", target.release_date);
    }
    if !target.changelog.is_empty() {
        println!();
        println!("{}", target.changelog);
        println!();
    }
}

fn print_report(current: &str, report: &UpdateReport) {
    println!(
        "{} {} → {}",
        "✓ Updated".green().bold(),
        current.cyan(),
        report.version.green().bold()
    );
    println!("  {} files applied, {} preserved", report.files_copied, report.files_preserved);
    println!("  Backup: {}", report.backup_path.display().to_string().dimmed());
    if report.backups_pruned > 0 {
        println!("  Pruned {} old backup(s)", report.backups_pruned);
    }
}
