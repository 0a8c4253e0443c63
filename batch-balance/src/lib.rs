//! Resumable batch balance adjustments
//!
//! A batch is a list of (target, amount) pairs requested through a location
//! fragment. The runner applies them one at a time, saving the cursor after
//! every confirmed step so an interrupted batch resumes where it stopped.

pub mod errors;
pub mod events;
pub mod executor;
pub mod identity;
pub mod params;
pub mod preflight;
pub mod reconcile;
pub mod runner;
pub mod storage;
pub mod summary;
#[cfg(test)]
mod tests;
pub mod types;

pub use errors::{BatchError, ParseError, PreflightViolation, StepFailure, StorageError};
pub use events::{BatchEvent, RunnerStatus};
pub use executor::{
    gated, ConfirmationHandle, DirectConfig, DirectExecutor, FormSurface, GatedExecutor,
    InteractiveExecutor, StepContext, StepExecutor, SubmissionOutcome,
};
pub use identity::{Identity, IdentityMap, IdentityProvider, PollingIdentity, StaticIdentity};
pub use params::{parse_batch, BatchParams};
pub use reconcile::{reconcile, Reconciliation};
pub use runner::{BatchRunner, ClearRequest, RunnerConfig};
pub use storage::{FileBackend, MemoryBackend, StateSlot, StorageBackend};
pub use summary::{format_amount, BatchSummary, EntryRow};
pub use types::{ActionType, AssetType, BatchEntry, BatchSpec, BatchState};
