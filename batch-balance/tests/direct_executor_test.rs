use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use batch_balance::{
    ActionType, AssetType, BatchEntry, BatchError, BatchRunner, DirectConfig, DirectExecutor,
    IdentityMap, MemoryBackend, RunnerConfig, RunnerStatus, StepContext, StepExecutor,
    StepFailure,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Captured {
    query: HashMap<String, String>,
    requested_with: Option<String>,
    cookie: Option<String>,
    body: Value,
}

/// Stand-in for the faction page endpoint. Replies are served in order;
/// once they run out every request succeeds.
#[derive(Clone, Default)]
struct FakePage {
    requests: Arc<Mutex<Vec<Captured>>>,
    replies: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
}

impl FakePage {
    async fn with_replies(replies: Vec<(StatusCode, &str)>) -> Self {
        let page = FakePage::default();
        page.replies
            .lock()
            .await
            .extend(replies.into_iter().map(|(s, b)| (s, b.to_string())));
        page
    }

    async fn serve(&self) -> String {
        let app = Router::new()
            .route("/page.php", post(handle_page))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn handle_page(
    State(page): State<FakePage>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    page.requests.lock().await.push(Captured {
        query,
        requested_with: header("x-requested-with"),
        cookie: header("cookie"),
        body,
    });
    page.replies
        .lock()
        .await
        .pop_front()
        .unwrap_or((StatusCode::OK, json!({"success": true}).to_string()))
}

fn executor(base_url: &str) -> DirectExecutor {
    DirectExecutor::new(
        DirectConfig::default()
            .with_base_url(base_url)
            .with_rfcv("tok123")
            .with_cookie("sid=abc")
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

fn ctx(action: ActionType, asset: AssetType) -> StepContext {
    StepContext::new(0, 1, action, asset, Some("Leslie"))
}

#[tokio::test]
async fn test_runner_posts_each_entry() {
    let page = FakePage::default();
    let base_url = page.serve().await;

    let runner = BatchRunner::new(
        RunnerConfig::default().with_min_step_interval(Duration::ZERO),
        Arc::new(MemoryBackend::new()),
        executor(&base_url),
    );
    let requested = batch_balance::BatchParams::new("15,16", "100,-250")
        .parse()
        .unwrap();
    runner
        .prepare(requested, IdentityMap::new())
        .await
        .unwrap();
    assert_eq!(runner.start().await.unwrap(), RunnerStatus::Completed);

    let requests = page.requests.lock().await.clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].query["sid"], "factionsGiveMoney");
    assert_eq!(requests[0].query["rfcv"], "tok123");
    assert_eq!(requests[0].requested_with.as_deref(), Some("XMLHttpRequest"));
    assert_eq!(requests[0].cookie.as_deref(), Some("sid=abc"));
    assert_eq!(
        requests[0].body,
        json!({"option": "addToBalance", "receiver": 15, "amount": 100})
    );
    assert_eq!(
        requests[1].body,
        json!({"option": "addToBalance", "receiver": 16, "amount": -250})
    );
}

#[tokio::test]
async fn test_give_points_request_shape() {
    let page = FakePage::default();
    let base_url = page.serve().await;

    executor(&base_url)
        .apply_step(
            &BatchEntry::new("1617955", 3),
            &ctx(ActionType::Give, AssetType::Points),
        )
        .await
        .unwrap();

    let requests = page.requests.lock().await;
    assert_eq!(requests[0].query["sid"], "factionsGivePoints");
    assert_eq!(
        requests[0].body,
        json!({"option": "giveMoney", "receiver": 1617955, "amount": 3})
    );
}

#[tokio::test]
async fn test_server_error_stops_runner() {
    let page = FakePage::with_replies(vec![
        (StatusCode::OK, r#"{"success":true}"#),
        (StatusCode::INTERNAL_SERVER_ERROR, "upstream down"),
    ])
    .await;
    let base_url = page.serve().await;

    let runner = BatchRunner::new(
        RunnerConfig::default().with_min_step_interval(Duration::ZERO),
        Arc::new(MemoryBackend::new()),
        executor(&base_url),
    );
    let requested = batch_balance::BatchParams::new("15,16,17", "1,2,3")
        .parse()
        .unwrap();
    runner
        .prepare(requested, IdentityMap::new())
        .await
        .unwrap();

    let err = runner.start().await.unwrap_err();
    match err {
        BatchError::Step {
            index,
            source: StepFailure::HttpStatus { status, body },
            ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(status, 500);
            assert_eq!(body, "upstream down");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(page.requests.lock().await.len(), 2);
    assert_eq!(runner.snapshot().unwrap().cursor(), 1);
}

#[tokio::test]
async fn test_malformed_and_unsuccessful_replies() {
    let page = FakePage::with_replies(vec![
        (StatusCode::OK, "<html>Please log in</html>"),
        (StatusCode::OK, r#"{"success":false,"text":"Not enough money"}"#),
    ])
    .await;
    let base_url = page.serve().await;
    let executor = executor(&base_url);
    let entry = BatchEntry::new("15", 10);
    let ctx = ctx(ActionType::Add, AssetType::Money);

    let first = executor.apply_step(&entry, &ctx).await.unwrap_err();
    assert!(matches!(first, StepFailure::UnexpectedResponse(ref raw) if raw.contains("log in")));

    let second = executor.apply_step(&entry, &ctx).await.unwrap_err();
    assert!(
        matches!(second, StepFailure::UnexpectedResponse(ref raw) if raw.contains("Not enough money"))
    );
}

#[tokio::test]
async fn test_non_numeric_receiver_sends_nothing() {
    let page = FakePage::default();
    let base_url = page.serve().await;

    let err = executor(&base_url)
        .apply_step(
            &BatchEntry::new("abc", 10),
            &ctx(ActionType::Add, AssetType::Money),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StepFailure::InvalidReceiver(ref id) if id == "abc"));
    assert!(page.requests.lock().await.is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = executor(&format!("http://{addr}"))
        .apply_step(
            &BatchEntry::new("15", 10),
            &ctx(ActionType::Add, AssetType::Money),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StepFailure::Network(_)));
}

#[tokio::test]
async fn test_slow_endpoint_times_out_and_keeps_cursor() {
    let app = Router::new().route(
        "/page.php",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"success": true}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let executor = DirectExecutor::new(
        DirectConfig::default()
            .with_base_url(format!("http://{addr}"))
            .with_rfcv("tok123")
            .with_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let runner = BatchRunner::new(
        RunnerConfig::default(),
        Arc::new(MemoryBackend::new()),
        executor,
    );
    let requested = batch_balance::BatchParams::new("15,16", "1,2")
        .parse()
        .unwrap();
    runner
        .prepare(requested, IdentityMap::new())
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let err = runner.start().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(
        err,
        BatchError::Step {
            index: 0,
            source: StepFailure::Timeout(_),
            ..
        }
    ));
    assert!(err.is_resumable());
    assert_eq!(runner.snapshot().unwrap().cursor(), 0);
    assert_eq!(runner.status(), RunnerStatus::Failed);
}
