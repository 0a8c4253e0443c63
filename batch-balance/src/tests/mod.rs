
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::StepFailure;
use crate::executor::{StepContext, StepExecutor};
use crate::types::{ActionType, AssetType, BatchEntry, BatchSpec, BatchState};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

pub fn batch(entries: &[(&str, i64)], action: ActionType, asset: AssetType) -> BatchState {
    BatchState::new(BatchSpec::new(
        entries
            .iter()
            .map(|(id, amount)| BatchEntry::new(*id, *amount))
            .collect(),
        action,
        asset,
    ))
}

/// Records every call; fails once for each index in `fail_once`. Each call
/// takes `delay` to settle.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<Recorded>>,
    delay: Duration,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<(usize, BatchEntry, Instant)>,
    fail_once: HashSet<usize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_once_at(index: usize) -> Self {
        let executor = Self::default();
        executor.inner.lock().unwrap().fail_once.insert(index);
        executor
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(usize, String)> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(index, entry, _)| (*index, entry.target_id.clone()))
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, _, at)| *at)
            .collect()
    }
}

#[async_trait]
impl StepExecutor for RecordingExecutor {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        let fails = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push((ctx.index, entry.clone(), Instant::now()));
            inner.fail_once.remove(&ctx.index)
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if fails {
            return Err(StepFailure::Network("connection reset".into()));
        }
        Ok(())
    }
}
