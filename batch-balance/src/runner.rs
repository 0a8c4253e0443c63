//! The batch state machine
//!
//! ```text
//! Idle -> Ready -> Running -> Completed | Failed
//!                     ^  \
//!                     |   AwaitingConfirmation (per entry, while the operator acts)
//!                     +---/
//! ```
//!
//! Progress is saved after every confirmed step, so a reload at any point
//! resumes exactly at the cursor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{BatchError, ParseError};
use crate::events::{BatchEvent, RunnerStatus};
use crate::executor::{StepContext, StepExecutor};
use crate::identity::IdentityMap;
use crate::preflight;
use crate::reconcile::reconcile;
use crate::storage::{StateSlot, StorageBackend};
use crate::summary::BatchSummary;
use crate::types::BatchState;

pub const DEFAULT_STORAGE_KEY: &str = "batbal-action";
pub const DEFAULT_MIN_STEP_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_EVENT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name of the persisted slot
    pub storage_key: String,
    /// Minimum time from the start of one step to the start of the next
    pub min_step_interval: Duration,
    pub event_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            min_step_interval: DEFAULT_MIN_STEP_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RunnerConfig {
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_min_step_interval(mut self, interval: Duration) -> Self {
        self.min_step_interval = interval;
        self
    }
}

/// Operator answer to "delete the saved batch?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearRequest {
    Confirmed,
    Declined,
}

impl From<bool> for ClearRequest {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            ClearRequest::Confirmed
        } else {
            ClearRequest::Declined
        }
    }
}

/// Status and event fan-out shared with step contexts
pub(crate) struct RunnerShared {
    status: RwLock<RunnerStatus>,
    events: broadcast::Sender<BatchEvent>,
}

impl RunnerShared {
    pub(crate) fn status(&self) -> RunnerStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: RunnerStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Errors (no subscribers) are ignored.
    pub(crate) fn emit(&self, event: BatchEvent) {
        let _ = self.events.send(event);
    }
}

pub struct BatchRunner {
    config: RunnerConfig,
    slot: StateSlot,
    executor: Arc<dyn StepExecutor>,
    shared: Arc<RunnerShared>,
    state: RwLock<Option<BatchState>>,
    identities: RwLock<IdentityMap>,
    /// Held by whichever of prepare, start or clear is in progress
    exclusive: Mutex<()>,
    /// Set when the last run stopped on an error that `start` may retry
    resume_on_start: AtomicBool,
}

impl BatchRunner {
    pub fn new(
        config: RunnerConfig,
        backend: Arc<dyn StorageBackend>,
        executor: impl StepExecutor + 'static,
    ) -> Self {
        let slot = StateSlot::new(backend, config.storage_key.clone());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            slot,
            executor: Arc::new(executor),
            shared: Arc::new(RunnerShared {
                status: RwLock::new(RunnerStatus::Idle),
                events,
            }),
            state: RwLock::new(None),
            identities: RwLock::new(IdentityMap::new()),
            exclusive: Mutex::new(()),
            resume_on_start: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn status(&self) -> RunnerStatus {
        self.shared.status()
    }

    /// Copy of the batch currently loaded, for rendering
    pub fn snapshot(&self) -> Option<BatchState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn summary(&self) -> Option<BatchSummary> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        self.snapshot()
            .map(|state| BatchSummary::new(&state, &identities))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.shared.events.subscribe()
    }

    /// Stream of runner events. Lagging consumers skip events rather than end the stream.
    pub fn event_stream(&self) -> impl Stream<Item = BatchEvent> + Send + Unpin {
        let mut rx = self.shared.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event stream lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn set_state(&self, state: Option<BatchState>) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn lock_exclusive(&self) -> Result<MutexGuard<'_, ()>, BatchError> {
        self.exclusive
            .try_lock()
            .map_err(|_| BatchError::Busy("a batch is running".into()))
    }

    fn fail(&self, err: BatchError) -> BatchError {
        error!("Batch Balance failed: {}", err);
        self.resume_on_start.store(false, Ordering::SeqCst);
        self.shared.set_status(RunnerStatus::Failed);
        self.shared.emit(BatchEvent::Failed {
            message: err.to_string(),
        });
        err
    }

    /// Load the saved batch, reconcile it with `parsed`, and run pre-flight.
    ///
    /// Returns the summary of the active batch, or `None` when there is
    /// nothing to do. On error the saved batch (if any) stays loaded so it
    /// can be shown, and the runner is `Failed`.
    #[instrument(level = "debug", skip_all)]
    pub async fn prepare(
        &self,
        parsed: Option<BatchState>,
        identities: IdentityMap,
    ) -> Result<Option<BatchSummary>, BatchError> {
        let _exclusive = self.lock_exclusive()?;
        let stored = self.load_for_display(identities).await?;

        let reconciled = match reconcile(parsed, stored) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };
        let resumed = reconciled.is_resumed();
        let Some(state) = reconciled.into_state() else {
            debug!("No batch requested and none saved");
            self.shared.set_status(RunnerStatus::Idle);
            return Ok(None);
        };
        self.activate(state, resumed)
    }

    /// Like [`BatchRunner::prepare`] for a request that failed to parse: the
    /// saved batch is loaded for display and the parse error becomes terminal.
    pub async fn prepare_rejected(
        &self,
        error: ParseError,
        identities: IdentityMap,
    ) -> BatchError {
        let _exclusive = match self.lock_exclusive() {
            Ok(guard) => guard,
            Err(e) => return e,
        };
        if let Err(e) = self.load_for_display(identities).await {
            return e;
        }
        self.fail(error.into())
    }

    async fn load_for_display(
        &self,
        identities: IdentityMap,
    ) -> Result<Option<BatchState>, BatchError> {
        *self.identities.write().unwrap_or_else(PoisonError::into_inner) = identities;
        let stored = self.slot.load().await.map_err(|e| self.fail(e.into()))?;
        self.set_state(stored.clone());
        Ok(stored)
    }

    fn activate(
        &self,
        state: BatchState,
        resumed: bool,
    ) -> Result<Option<BatchSummary>, BatchError> {
        let check = {
            let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
            preflight::check(&state, &identities)
        };
        self.set_state(Some(state.clone()));
        if let Err(violation) = check {
            return Err(self.fail(violation.into()));
        }

        info!(
            entries = state.len(),
            cursor = state.cursor(),
            action = %state.action_type(),
            asset = %state.asset_type(),
            resumed,
            "Batch ready"
        );
        self.shared.set_status(RunnerStatus::Ready);
        self.shared.emit(BatchEvent::Ready {
            cursor: state.cursor(),
            total: state.len(),
            resumed,
        });
        Ok(self.summary())
    }

    /// Run the loaded batch to completion or first failure.
    ///
    /// Runs from `Ready`, or from `Failed` when the run stopped on a failed
    /// step, in which case it resumes at that entry. Otherwise, or while
    /// another call is in progress or the batch is empty, it is a no-op that
    /// returns the current status.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<RunnerStatus, BatchError> {
        let Ok(_exclusive) = self.exclusive.try_lock() else {
            debug!("start() ignored: runner busy");
            return Ok(self.status());
        };
        let state = {
            let mut status = self
                .shared
                .status
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let retry = *status == RunnerStatus::Failed
                && self.resume_on_start.load(Ordering::SeqCst);
            if *status != RunnerStatus::Ready && !retry {
                debug!(status = ?*status, "start() ignored: not ready");
                return Ok(*status);
            }
            let Some(state) = self.snapshot().filter(|s| !s.is_empty()) else {
                debug!("start() ignored: empty batch");
                return Ok(*status);
            };
            if retry {
                info!(cursor = state.cursor(), "Retrying from the failed entry");
            }
            *status = RunnerStatus::Running;
            state
        };

        match self.run_loop(state).await {
            Ok(()) => Ok(RunnerStatus::Completed),
            Err(e) => {
                let resumable = e.is_resumable();
                let e = self.fail(e);
                self.resume_on_start.store(resumable, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn run_loop(&self, mut state: BatchState) -> Result<(), BatchError> {
        let total = state.len();
        self.slot.save(&state).await?;
        info!(cursor = state.cursor(), total, "Starting batch");
        self.shared.emit(BatchEvent::Started {
            cursor: state.cursor(),
            total,
        });

        while let Some(entry) = state.current().cloned() {
            let index = state.cursor();
            let started = Instant::now();
            let display_name = {
                let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
                identities.display_name(&entry.target_id).map(str::to_string)
            };
            let ctx = StepContext::new(
                index,
                total,
                state.action_type(),
                state.asset_type(),
                display_name.as_deref(),
            )
            .attach(self.shared.clone());

            debug!(index, target_id = %entry.target_id, amount = entry.amount, "Applying step");
            self.shared.emit(BatchEvent::StepStarted {
                index,
                target_id: entry.target_id.clone(),
                amount: entry.amount,
            });

            if let Err(source) = self.executor.apply_step(&entry, &ctx).await {
                error!(index, target_id = %entry.target_id, error = %source, "Step failed");
                self.shared.emit(BatchEvent::StepFailed {
                    index,
                    target_id: entry.target_id.clone(),
                    message: source.to_string(),
                });
                return Err(BatchError::Step {
                    index,
                    target_id: entry.target_id,
                    source,
                });
            }
            self.shared.set_status(RunnerStatus::Running);

            state.advance();
            self.set_state(Some(state.clone()));
            self.slot.save(&state).await?;
            self.shared.emit(BatchEvent::Progress {
                done: state.cursor(),
                total,
                target_id: entry.target_id,
            });

            if state.is_complete() {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed < self.config.min_step_interval {
                tokio::time::sleep(self.config.min_step_interval - elapsed).await;
            }
        }

        self.slot.clear().await?;
        self.set_state(Some(state));
        self.shared.set_status(RunnerStatus::Completed);
        info!(total, "All done!");
        self.shared.emit(BatchEvent::Completed { total });
        Ok(())
    }

    /// Delete the saved batch. Requires the operator's confirmation and is
    /// refused while a batch is running.
    #[instrument(skip(self))]
    pub async fn clear(&self, request: ClearRequest) -> Result<(), BatchError> {
        if request != ClearRequest::Confirmed {
            return Err(BatchError::ClearNotConfirmed);
        }
        let _exclusive = self.exclusive.try_lock().map_err(|_| {
            BatchError::Busy("cannot clear saved data while a batch is running".into())
        })?;
        self.slot.clear().await?;
        self.set_state(None);
        self.shared.set_status(RunnerStatus::Idle);
        info!(key = %self.slot.key(), "Saved batch deleted");
        self.shared.emit(BatchEvent::Cleared);
        Ok(())
    }
}
