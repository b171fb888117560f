use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};

use super::common::CommandContext;
use crate::models::{UpdateRecord, UpdateStatus};

/// Arguments for `updraft history`.
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// Print the records as JSON.
    #[arg(long)]
    pub json: bool,

    /// Show only the most recent N records.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

impl HistoryCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let settings = ctx.load_settings_or_default().await?;
        let ledger = ctx.ledger(&settings.state_dir).await?;

        let records = ledger.records();
        let records = &records[records.len().saturating_sub(self.limit.unwrap_or(records.len()))..];

        if self.json {
            println!("{}", serde_json::to_string_pretty(records)?);
            return Ok(());
        }

        if records.is_empty() {
            println!("No update history.");
            return Ok(());
        }

        for record in records {
            println!("{}", format_record(record));
        }
        Ok(())
    }
}

fn status_label(status: UpdateStatus) -> ColoredString {
    match status {
        UpdateStatus::Success => "success".green(),
        UpdateStatus::Failed => "failed".red(),
        UpdateStatus::RolledBack => "rolled_back".yellow(),
    }
}

fn format_record(record: &UpdateRecord) -> String {
    format!(
        "{}  {:<12} {:<11}  {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.version,
        status_label(record.status),
        record.backup_path.display().to_string().dimmed()
    )
}
