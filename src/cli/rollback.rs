use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::{CommandContext, confirm};

/// Arguments for `updraft rollback`.
#[derive(Args, Debug)]
pub struct RollbackCommand {
    /// Version whose update should be undone; defaults to the most recent successful
    /// update.
    #[arg(value_name = "VERSION")]
    pub version: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

impl RollbackCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config().await?;
        let mut orchestrator = ctx.orchestrator(&config).await?;

        let version = match self.version {
            Some(version) => version,
            None => match orchestrator.ledger().latest_success() {
                Some(record) => record.version.clone(),
                None => {
                    println!("{}", "No successful update to roll back.".yellow());
                    return Ok(());
                }
            },
        };

        if !self.yes
            && !confirm(&format!(
                "Restore {} to its state before the update to {}?",
                orchestrator.install_dir().display(),
                version
            ))
            .await?
        {
            println!("{}", "Rollback cancelled.".yellow());
            return Ok(());
        }

        let backup = orchestrator.rollback(&version).await?;
        println!(
            "{} update to {} (restored {})",
            "✓ Rolled back".green().bold(),
            version.cyan(),
            backup.display().to_string().dimmed()
        );
        Ok(())
    }
}
