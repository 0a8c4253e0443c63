use async_trait::async_trait;
use batch_balance::{
    BatchEntry, BatchEvent, BatchParams, BatchRunner, FileBackend, IdentityMap, RunnerConfig,
    RunnerStatus, StateSlot, StepContext, StepExecutor, StepFailure,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Succeeds for the first `budget` calls, then fails.
struct Budgeted {
    budget: usize,
    calls: AtomicUsize,
}

impl Budgeted {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StepExecutor for Budgeted {
    async fn apply_step(&self, entry: &BatchEntry, _ctx: &StepContext) -> Result<(), StepFailure> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.budget {
            return Err(StepFailure::Timeout(format!("no answer for {}", entry.target_id)));
        }
        Ok(())
    }
}

fn config() -> RunnerConfig {
    RunnerConfig::default().with_min_step_interval(Duration::ZERO)
}

fn request() -> BatchParams {
    BatchParams::from_fragment(
        "#/tab=controls&batbal_uids=1523812,1617955,4&batbal_amounts=120,-250,1500&batbal_action=add",
    )
}

#[tokio::test]
async fn test_batch_survives_restart_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path()));
    let path = backend.path_for("batbal-action");
    assert!(path.ends_with("BATCH_BALANCE_batbal-action.json"));

    let first = BatchRunner::new(config(), backend.clone(), Budgeted::new(2));
    first
        .prepare(request().parse().unwrap(), IdentityMap::new())
        .await
        .unwrap();
    first.start().await.unwrap_err();

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["cursor"], 2);
    assert_eq!(on_disk["actionType"], "add");
    assert_eq!(on_disk["entries"][1], serde_json::json!(["1617955", -250]));

    // Fresh process, fresh backend over the same directory
    let reopened = Arc::new(FileBackend::new(dir.path()));
    let second = BatchRunner::new(config(), reopened, Budgeted::new(usize::MAX));
    let summary = second
        .prepare(request().parse().unwrap(), IdentityMap::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.cursor, 2);
    assert_eq!(second.start().await.unwrap(), RunnerStatus::Completed);

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "null");
    let slot = StateSlot::new(Arc::new(FileBackend::new(dir.path())), "batbal-action");
    assert!(slot.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_custom_prefix_and_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("state").join("batbal");
    let backend = Arc::new(FileBackend::new(&nested).with_prefix("test_"));
    let slot = StateSlot::new(backend.clone(), "slot");

    assert!(slot.load().await.unwrap().is_none());
    let state = request().parse().unwrap().unwrap();
    slot.save(&state).await.unwrap();
    assert!(nested.join("test_slot.json").exists());
    assert_eq!(slot.load().await.unwrap(), Some(state));
}

#[tokio::test]
async fn test_event_stream_follows_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = BatchRunner::new(
        config(),
        Arc::new(FileBackend::new(dir.path())),
        Budgeted::new(usize::MAX),
    );
    let events = runner.event_stream();

    runner
        .prepare(request().parse().unwrap(), IdentityMap::new())
        .await
        .unwrap();
    runner.start().await.unwrap();

    let lines: Vec<String> = events
        .take_while(|e| futures::future::ready(!matches!(e, BatchEvent::Completed { .. })))
        .map(|e| e.status_line())
        .collect()
        .await;
    assert_eq!(lines.first().map(String::as_str), Some("Progress: 0 / 3 done"));
    assert_eq!(lines.last().map(String::as_str), Some("Progress: 3 / 3 done"));
    assert!(lines.iter().any(|l| l == "Current progress: 0 / 3 done"));
}
