use anyhow::{Context, Result};
use batch_balance::{BatchSummary, ClearRequest, RunnerConfig};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::{ask, load_identities, stdin_lines, NoTransport, StateOptions};
use crate::output;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// JSON member list used for display names
    #[arg(long)]
    identities: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, state: &StateOptions) -> Result<()> {
        let identities = load_identities(self.identities.as_ref()).await?;
        let saved = state
            .slot()
            .load()
            .await
            .context("Failed to read the saved batch")?;

        let Some(saved) = saved else {
            if self.json {
                println!("null");
            } else {
                println!("No saved batch.");
            }
            return Ok(());
        };
        let summary = BatchSummary::new(&saved, &identities);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            output::print_summary(&summary);
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Delete without asking
    #[arg(short, long)]
    yes: bool,
}

impl ClearCommand {
    pub async fn execute(&self, state: &StateOptions) -> Result<()> {
        let runner = state.runner(RunnerConfig::default(), NoTransport);
        let confirmed = self.yes
            || ask(
                &mut stdin_lines(),
                "Delete the saved Batch Balance data? This cannot be undone.",
            )
            .await?;

        match runner.clear(ClearRequest::from(confirmed)).await {
            Ok(()) => {
                println!("{}", "Saved data has been deleted.".green());
                Ok(())
            }
            Err(batch_balance::BatchError::ClearNotConfirmed) => {
                println!("Nothing deleted.");
                Ok(())
            }
            Err(e) => Err(e).context("Failed to delete the saved batch"),
        }
    }
}
