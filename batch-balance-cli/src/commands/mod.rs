use anyhow::{Context, Result};
use async_trait::async_trait;
use batch_balance::{
    BatchEntry, BatchParams, BatchRunner, FileBackend, IdentityMap, IdentityProvider,
    RunnerConfig, StateSlot, StaticIdentity, StepContext, StepExecutor, StepFailure,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::debug;

mod run;
mod status;

pub use run::{PlanCommand, RunCommand};
pub use status::{ClearCommand, StatusCommand};

/// Where the saved batch lives
pub struct StateOptions {
    dir: PathBuf,
    key: String,
}

impl StateOptions {
    pub fn new(dir: PathBuf, key: String) -> Self {
        Self { dir, key }
    }

    pub fn slot(&self) -> StateSlot {
        StateSlot::new(Arc::new(FileBackend::new(&self.dir)), self.key.clone())
    }

    pub fn runner(
        &self,
        config: RunnerConfig,
        executor: impl StepExecutor + 'static,
    ) -> BatchRunner {
        BatchRunner::new(
            config.with_storage_key(self.key.clone()),
            Arc::new(FileBackend::new(&self.dir)),
            executor,
        )
    }
}

/// Executor for commands that never start the runner
pub struct NoTransport;

#[async_trait]
impl StepExecutor for NoTransport {
    async fn apply_step(&self, entry: &BatchEntry, _ctx: &StepContext) -> Result<(), StepFailure> {
        Err(StepFailure::Interaction(format!(
            "read-only command, {} was not submitted",
            entry.target_id
        )))
    }
}

/// How a batch is requested on the command line
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Location fragment, e.g. '#/tab=controls&batbal_uids=15,16&batbal_amounts=100,-5'
    #[arg(long, conflicts_with_all = ["ids", "amounts", "action", "asset"])]
    fragment: Option<String>,

    /// Comma-separated player ids
    #[arg(long, requires = "amounts")]
    ids: Option<String>,

    /// Comma-separated signed amounts, one per id
    #[arg(long, requires = "ids", allow_hyphen_values = true)]
    amounts: Option<String>,

    /// add (faction balance) or give (direct transfer)
    #[arg(long)]
    action: Option<String>,

    /// money or points
    #[arg(long)]
    asset: Option<String>,

    /// JSON member list: {"<id>": {"name": "...", "isInFaction": true}}
    #[arg(long)]
    identities: Option<PathBuf>,
}

impl BatchArgs {
    pub fn params(&self) -> BatchParams {
        if let Some(fragment) = &self.fragment {
            return BatchParams::from_fragment(fragment);
        }
        BatchParams {
            ids: self.ids.clone(),
            amounts: self.amounts.clone(),
            action: self.action.clone(),
            asset: self.asset.clone(),
        }
    }

    pub async fn identities(&self) -> Result<IdentityMap> {
        load_identities(self.identities.as_ref()).await
    }
}

pub async fn load_identities(path: Option<&PathBuf>) -> Result<IdentityMap> {
    let Some(path) = path else {
        return Ok(IdentityMap::new());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read member list {}", path.display()))?;
    let map: IdentityMap = serde_json::from_str(&raw)
        .with_context(|| format!("Member list {} is not valid JSON", path.display()))?;
    debug!(members = map.len(), "Loaded member list");
    Ok(StaticIdentity::new(map).wait_ready().await)
}

pub type StdinLines = Lines<BufReader<Stdin>>;

pub fn stdin_lines() -> StdinLines {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Ask a yes/no question on stdin; anything but y/yes is a no.
pub async fn ask(lines: &mut StdinLines, question: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{question} [y/N] ").as_bytes()).await?;
    stdout.flush().await?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
