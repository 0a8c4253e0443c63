use tracing::{debug, info};

use crate::errors::BatchError;
use crate::types::BatchState;

/// Outcome of merging the requested batch with the saved one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing requested, nothing saved
    Nothing,
    /// A new batch from the trigger parameters
    Fresh(BatchState),
    /// The saved batch, progress intact
    Resumed(BatchState),
}

impl Reconciliation {
    pub fn state(&self) -> Option<&BatchState> {
        match self {
            Reconciliation::Nothing => None,
            Reconciliation::Fresh(state) | Reconciliation::Resumed(state) => Some(state),
        }
    }

    pub fn into_state(self) -> Option<BatchState> {
        match self {
            Reconciliation::Nothing => None,
            Reconciliation::Fresh(state) | Reconciliation::Resumed(state) => Some(state),
        }
    }

    pub fn is_resumed(&self) -> bool {
        matches!(self, Reconciliation::Resumed(_))
    }
}

/// Decide which batch is active.
///
/// A saved batch always wins over an identical request, so its cursor survives
/// reloads. A request that differs in entries, order, action or asset is a
/// conflict the operator has to resolve by clearing the saved batch.
pub fn reconcile(
    parsed: Option<BatchState>,
    stored: Option<BatchState>,
) -> Result<Reconciliation, BatchError> {
    match (parsed, stored) {
        (None, None) => Ok(Reconciliation::Nothing),
        (Some(parsed), None) => {
            debug!(entries = parsed.len(), "No saved batch; using requested batch");
            Ok(Reconciliation::Fresh(parsed))
        }
        (None, Some(stored)) => {
            info!(
                cursor = stored.cursor(),
                entries = stored.len(),
                "Resuming saved batch"
            );
            Ok(Reconciliation::Resumed(stored))
        }
        (Some(parsed), Some(stored)) => {
            if parsed.same_batch(&stored) {
                info!(
                    cursor = stored.cursor(),
                    entries = stored.len(),
                    "Requested batch matches saved batch; resuming"
                );
                Ok(Reconciliation::Resumed(stored))
            } else {
                Err(BatchError::ConflictingBatch)
            }
        }
    }
}
