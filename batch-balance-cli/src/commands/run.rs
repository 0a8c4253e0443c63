use anyhow::{Context, Result};
use batch_balance::executor::direct::DEFAULT_BASE_URL;
use batch_balance::{
    gated, BatchError, BatchEvent, BatchRunner, BatchSummary, ConfirmationHandle, DirectConfig,
    DirectExecutor, RunnerConfig, StepExecutor,
};
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info};

use super::{ask, stdin_lines, BatchArgs, NoTransport, StateOptions, StdinLines};
use crate::output;

#[derive(Debug, Args)]
pub struct PlanCommand {
    #[command(flatten)]
    batch: BatchArgs,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl PlanCommand {
    pub async fn execute(&self, state: &StateOptions) -> Result<()> {
        // Never started, so nothing is written
        let runner = state.runner(RunnerConfig::default(), NoTransport);
        let Some(summary) = prepare(&runner, &self.batch).await? else {
            println!("No batch requested and no saved batch found.");
            return Ok(());
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            output::print_summary(&summary);
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    batch: BatchArgs,

    #[arg(long, env = "BATBAL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Anti-forgery token of the logged-in session
    #[arg(long, env = "BATBAL_RFCV", hide_env_values = true)]
    rfcv: String,

    /// Cookie header of the logged-in session
    #[arg(long, env = "BATBAL_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// Wait for Enter before submitting each entry
    #[arg(long)]
    confirm_each: bool,

    /// Minimum milliseconds between the starts of two entries
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Start without asking
    #[arg(short, long)]
    yes: bool,
}

impl RunCommand {
    pub async fn execute(&self, state: &StateOptions) -> Result<()> {
        let mut config = DirectConfig::default()
            .with_base_url(&self.base_url)
            .with_rfcv(&self.rfcv)
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(cookie) = &self.cookie {
            config = config.with_cookie(cookie);
        }
        let direct = DirectExecutor::new(config).context("Failed to create HTTP client")?;

        let (executor, confirmations): (Box<dyn StepExecutor>, Option<ConfirmationHandle>) =
            if self.confirm_each {
                let (executor, handle) = gated(direct);
                (Box::new(executor), Some(handle))
            } else {
                (Box::new(direct), None)
            };
        let runner = state.runner(
            RunnerConfig::default().with_min_step_interval(Duration::from_millis(self.interval_ms)),
            executor,
        );

        let Some(summary) = prepare(&runner, &self.batch).await? else {
            println!("No batch requested and no saved batch found.");
            return Ok(());
        };
        output::print_summary(&summary);
        if summary.entry_count == summary.cursor {
            // A finished batch left in the slot; completing it clears the slot
            runner.start().await.context("Failed to clear the finished batch")?;
            println!("Nothing to do. The finished batch was cleared.");
            return Ok(());
        }

        let mut lines = stdin_lines();
        if !self.yes && !ask(&mut lines, "Start?").await? {
            println!("Not started. Progress so far is saved.");
            return Ok(());
        }

        let printer = tokio::spawn(follow(runner.event_stream(), confirmations, lines));

        let outcome = tokio::select! {
            result = runner.start() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted by operator");
                println!(
                    "{}",
                    "Interrupted. Run again to resume from the saved progress.".yellow()
                );
                std::process::exit(130);
            }
        };
        let final_summary = runner.summary();
        // Closes the event stream once the printer has caught up
        drop(runner);
        let _ = printer.await;

        match outcome {
            Ok(status) => {
                debug!(?status, "Run finished");
                if let Some(summary) = final_summary {
                    println!("{}", summary.progress_line());
                }
                Ok(())
            }
            Err(e) => {
                let hint = if e.is_resumable() {
                    "Batch stopped; run again to retry from the failed entry"
                } else {
                    "Batch stopped"
                };
                Err(anyhow::Error::new(e).context(hint))
            }
        }
    }
}

/// Print events as they arrive and, with confirmations enabled, release each
/// entry when the operator presses Enter.
async fn follow(
    mut events: impl futures::Stream<Item = BatchEvent> + Unpin,
    confirmations: Option<ConfirmationHandle>,
    mut lines: StdinLines,
) {
    while let Some(event) = events.next().await {
        output::print_event(&event);
        if let (BatchEvent::AwaitingConfirmation { .. }, Some(handle)) = (&event, &confirmations) {
            println!("{}", "Press Enter to submit".dimmed());
            match lines.next_line().await {
                Ok(Some(_)) => {
                    handle.confirm().await;
                }
                // stdin closed: dropping the handle fails the pending entry
                _ => return,
            }
        }
    }
}

/// Parse the request and reconcile it with the saved batch. Errors are shown
/// together with whatever saved batch is in the way.
async fn prepare(runner: &BatchRunner, args: &BatchArgs) -> Result<Option<BatchSummary>> {
    let identities = args.identities().await?;
    let prepared = match args.params().parse() {
        Ok(parsed) => runner.prepare(parsed, identities).await,
        Err(e) => Err(runner.prepare_rejected(e, identities).await),
    };
    match prepared {
        Ok(summary) => Ok(summary),
        Err(e) => {
            if let Some(saved) = runner.summary() {
                output::print_summary(&saved);
            }
            if matches!(e, BatchError::ConflictingBatch) {
                eprintln!(
                    "{}",
                    "Use `batbal status` to inspect it or `batbal clear` to discard it.".dimmed()
                );
            }
            Err(e.into())
        }
    }
}
