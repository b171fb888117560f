use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::{CommandContext, current_version};
use crate::client::UpdateClient;
use crate::models::{UpdatesInfo, VersionInfo};
use crate::resolver::VersionResolver;

/// Arguments for `updraft check`.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Installed version; defaults to the last successful update in the history.
    #[arg(long, env = "UPDRAFT_CURRENT_VERSION")]
    pub current_version: Option<String>,

    /// Print the raw server response as JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config().await?;
        let ledger = ctx.ledger(config.state_dir()).await?;
        let current = current_version(self.current_version.as_deref(), &ledger)?;

        let client = UpdateClient::new(config)?;
        let info = client.check_for_updates(&current).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }

        print_summary(&current, &info, &client.resolver(&info));
        Ok(())
    }
}

fn print_summary(current: &str, info: &UpdatesInfo, resolver: &VersionResolver<'_>) {
    println!("Current version: {}", current.cyan());

    if !resolver.has_update() {
        println!("{}", "You are on the latest version.".green());
        return;
    }

    println!("Latest version:  {}", info.latest_version.green().bold());
    if let Some(forced) = resolver.forced_update() {
        println!(
            "{} version {} is required",
            "Mandatory update:".red().bold(),
            forced.version.yellow()
        );
    }
    if let Some(recommended) = resolver.recommended() {
        println!("Recommended:     {}", recommended.version.green());
    }

    println!();
    println!("{}", "Available versions:".bold());
    for version in &info.available_versions {
        println!("  {}", version_line(version, resolver.is_skipped(&version.version)));
    }
}

fn version_line(version: &VersionInfo, skipped: bool) -> String {
    let mut line = format!("{:<12} {}", version.version, version.release_date.dimmed());
    if version.is_forced {
        line.push_str(&format!(" {}", "[forced]".red()));
    }
    if skipped {
        line.push_str(&format!(" {}", "[skipped]".yellow()));
    }
    if !version.is_downloadable {
        line.push_str(&format!(" {}", "[not downloadable]".dimmed()));
    }
    if let Some(first) = version.changelog.lines().next().filter(|l| !l.is_empty()) {
        line.push_str(&format!("\n{:14}{}", "", first));
    }
    line
}
