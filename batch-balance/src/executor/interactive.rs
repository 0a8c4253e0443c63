//! Simulated form submission
//!
//! The surface fills the receiver and amount controls, triggers the page's own
//! confirmation, and reports the page's result indicator as a single event.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{StepContext, StepExecutor};
use crate::errors::StepFailure;
use crate::types::BatchEntry;

/// Terminal result shown by the page after a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success,
    Failure(String),
}

/// The page controls an [`InteractiveExecutor`] drives
#[async_trait]
pub trait FormSurface: Send + Sync {
    /// Fill the receiver and amount controls.
    async fn populate(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure>;

    /// Subscribe to the next result indicator. Called before [`FormSurface::confirm`].
    fn observe_result(&self) -> oneshot::Receiver<SubmissionOutcome>;

    /// Trigger the page's confirmation action.
    async fn confirm(&self) -> Result<(), StepFailure>;

    /// Try to close the confirmation message. `Ok(true)` once it is gone.
    async fn dismiss(&self) -> Result<bool, StepFailure>;
}

#[async_trait]
impl<T: FormSurface + ?Sized> FormSurface for Arc<T> {
    async fn populate(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        (**self).populate(entry, ctx).await
    }

    fn observe_result(&self) -> oneshot::Receiver<SubmissionOutcome> {
        (**self).observe_result()
    }

    async fn confirm(&self) -> Result<(), StepFailure> {
        (**self).confirm().await
    }

    async fn dismiss(&self) -> Result<bool, StepFailure> {
        (**self).dismiss().await
    }
}

/// Retry schedule for closing the confirmation message
#[derive(Debug, Clone)]
pub struct DismissPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DismissPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        }
    }
}

impl DismissPolicy {
    /// Delay before retry number `attempt` (0-based): doubles each time, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

pub struct InteractiveExecutor<S> {
    surface: S,
    dismiss: DismissPolicy,
}

impl<S: FormSurface> InteractiveExecutor<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            dismiss: DismissPolicy::default(),
        }
    }

    pub fn with_dismiss_policy(mut self, policy: DismissPolicy) -> Self {
        self.dismiss = policy;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Returns whether the message was closed within the policy's attempts.
    async fn dismiss_with_retry(&self) -> bool {
        for attempt in 0..self.dismiss.max_attempts {
            match self.surface.dismiss().await {
                Ok(true) => {
                    debug!(attempt = attempt + 1, "Confirmation dismissed");
                    return true;
                }
                Ok(false) => {
                    debug!(attempt = attempt + 1, "Confirmation still open");
                }
                Err(e) => {
                    warn!(
                        "Dismiss failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.dismiss.max_attempts,
                        e
                    );
                }
            }
            if attempt + 1 < self.dismiss.max_attempts {
                tokio::time::sleep(self.dismiss.delay_for(attempt)).await;
            }
        }
        false
    }
}

#[async_trait]
impl<S: FormSurface> StepExecutor for InteractiveExecutor<S> {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        self.surface.populate(entry, ctx).await?;
        let result = self.surface.observe_result();
        self.surface.confirm().await?;

        ctx.awaiting_confirmation(entry);
        info!("{}", ctx.waiting_prompt(entry));
        let outcome = result.await.map_err(|_| {
            StepFailure::ChannelClosed("result indicator went away before settling".into())
        })?;

        // The adjustment has settled; dismissal never changes the outcome.
        if !self.dismiss_with_retry().await {
            warn!(
                attempts = self.dismiss.max_attempts,
                "Could not dismiss the confirmation message"
            );
        }

        match outcome {
            SubmissionOutcome::Success => Ok(()),
            SubmissionOutcome::Failure(message) => Err(StepFailure::Rejected(message)),
        }
    }
}
