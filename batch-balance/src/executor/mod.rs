//! Execution of a single batch entry
//!
//! The runner only knows [`StepExecutor`]. Variants:
//! - [`DirectExecutor`]: one JSON request per entry
//! - [`InteractiveExecutor`]: drives a form through a [`FormSurface`]
//! - [`GatedExecutor`]: waits for the operator before delegating to another executor

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::StepFailure;
use crate::events::{BatchEvent, RunnerStatus};
use crate::identity::UNKNOWN_PLAYER;
use crate::runner::RunnerShared;
use crate::summary::format_amount;
use crate::types::{ActionType, AssetType, BatchEntry};

pub mod direct;
pub mod gated;
pub mod interactive;

pub use direct::{DirectConfig, DirectExecutor};
pub use gated::{gated, ConfirmationHandle, GatedExecutor};
pub use interactive::{DismissPolicy, FormSurface, InteractiveExecutor, SubmissionOutcome};

/// What an executor knows about the step it is running
#[derive(Clone)]
pub struct StepContext {
    pub index: usize,
    pub total: usize,
    pub action_type: ActionType,
    pub asset_type: AssetType,
    pub display_name: String,
    shared: Option<Arc<RunnerShared>>,
}

impl StepContext {
    pub fn new(
        index: usize,
        total: usize,
        action_type: ActionType,
        asset_type: AssetType,
        display_name: Option<&str>,
    ) -> Self {
        Self {
            index,
            total,
            action_type,
            asset_type,
            display_name: display_name.unwrap_or(UNKNOWN_PLAYER).to_string(),
            shared: None,
        }
    }

    pub(crate) fn attach(mut self, shared: Arc<RunnerShared>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Prompt text for this entry, e.g. `Add money: Leslie [15] +120`
    pub fn prompt(&self, entry: &BatchEntry) -> String {
        self.describe(self.action_type.verb(), entry)
    }

    /// Same as [`StepContext::prompt`] with the in-progress verb
    pub fn waiting_prompt(&self, entry: &BatchEntry) -> String {
        self.describe(self.action_type.waiting_verb(), entry)
    }

    fn describe(&self, verb: &str, entry: &BatchEntry) -> String {
        format!(
            "{verb} {}: {} [{}] {}",
            self.asset_type,
            self.display_name,
            entry.target_id,
            format_amount(entry.amount)
        )
    }

    /// Announce that this step now waits on the operator. The runner stays in
    /// `AwaitingConfirmation` until [`StepContext::confirmation_received`].
    pub fn awaiting_confirmation(&self, entry: &BatchEntry) {
        let Some(shared) = &self.shared else {
            return;
        };
        shared.set_status(RunnerStatus::AwaitingConfirmation);
        shared.emit(BatchEvent::AwaitingConfirmation {
            index: self.index,
            target_id: entry.target_id.clone(),
            amount: entry.amount,
            prompt: self.prompt(entry),
        });
    }

    /// The operator released this step; the runner is back to `Running`
    /// while the transport completes it.
    pub fn confirmation_received(&self) {
        if let Some(shared) = &self.shared {
            shared.set_status(RunnerStatus::Running);
        }
    }
}

/// Performs one balance adjustment and resolves once it has settled.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure>;
}

#[async_trait]
impl<T: StepExecutor + ?Sized> StepExecutor for Arc<T> {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        (**self).apply_step(entry, ctx).await
    }
}

#[async_trait]
impl<T: StepExecutor + ?Sized> StepExecutor for Box<T> {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        (**self).apply_step(entry, ctx).await
    }
}
