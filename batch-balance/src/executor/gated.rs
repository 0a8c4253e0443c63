use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::{StepContext, StepExecutor};
use crate::errors::StepFailure;
use crate::types::BatchEntry;

/// Wraps an executor so every entry waits for an explicit operator go-ahead,
/// like a per-entry submit button.
pub struct GatedExecutor<E> {
    inner: E,
    confirmations: Mutex<mpsc::Receiver<()>>,
}

/// Operator side of a [`GatedExecutor`]
#[derive(Clone)]
pub struct ConfirmationHandle {
    tx: mpsc::Sender<()>,
}

impl ConfirmationHandle {
    /// Release the entry currently awaiting confirmation. Returns `false` once
    /// the executor is gone.
    pub async fn confirm(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }

    /// Non-blocking variant for UI callbacks; extra clicks are dropped.
    pub fn try_confirm(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

pub fn gated<E: StepExecutor>(inner: E) -> (GatedExecutor<E>, ConfirmationHandle) {
    let (tx, rx) = mpsc::channel(1);
    (
        GatedExecutor {
            inner,
            confirmations: Mutex::new(rx),
        },
        ConfirmationHandle { tx },
    )
}

impl<E> GatedExecutor<E> {
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: StepExecutor> StepExecutor for GatedExecutor<E> {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        let mut confirmations = self.confirmations.lock().await;
        // Confirmations given before this entry was shown do not count
        while confirmations.try_recv().is_ok() {}

        ctx.awaiting_confirmation(entry);
        if confirmations.recv().await.is_none() {
            return Err(StepFailure::ChannelClosed(format!(
                "no operator left to confirm {}",
                ctx.prompt(entry)
            )));
        }
        drop(confirmations);
        ctx.confirmation_received();

        debug!(index = ctx.index, "Operator confirmed entry");
        self.inner.apply_step(entry, ctx).await
    }
}
