//! Retry and timeout behaviour with a scripted transport.
//!
//! Tokio's clock is paused, so the five-second retry delays and the GET
//! timeout elapse instantly while still being measurable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use resource_core::{
    CacheConfig, CacheFiles, CacheMode, ExecuteError, ExecutorConfig, HttpMethod, HttpResponse,
    LogicalRequest, NormalizedRequest, RequestExecutor, Transport, TransportError,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::time::Instant;

const BASE: &str = "https://api.example.com/v1";

/// Plays back a queue of outcomes; once the queue is empty every call fails
/// with a refused connection.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: AtomicU32,
    hang_for: Option<Duration>,
}

impl ScriptedTransport {
    fn with(outcomes: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    fn hanging(duration: Duration) -> Self {
        Self {
            hang_for: Some(duration),
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, _request: &NormalizedRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(duration) = self.hang_for {
            tokio::time::sleep(duration).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(TransportError::Connect("connection refused".to_string())))
    }
}

fn ok(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status,
        headers: Vec::new(),
        body: body.to_string(),
    })
}

fn refused() -> Result<HttpResponse, TransportError> {
    Err(TransportError::Connect("connection refused".to_string()))
}

fn executor(transport: ScriptedTransport) -> RequestExecutor<ScriptedTransport> {
    RequestExecutor::new(&ExecutorConfig::new(BASE), transport).unwrap()
}

#[tokio::test(start_paused = true)]
async fn get_is_attempted_five_times_five_seconds_apart() {
    let exec = executor(ScriptedTransport::default());
    let started = Instant::now();

    let err = exec
        .execute(&LogicalRequest::get("/tenants/current"))
        .await
        .unwrap_err();

    assert_eq!(exec.transport().calls(), 5);
    assert_eq!(started.elapsed(), Duration::from_secs(20));
    let ExecuteError::Transport(failure) = err else {
        panic!("expected transport failure, got {err:?}");
    };
    assert_eq!(failure.attempts, 5);
    assert_eq!(failure.method, HttpMethod::Get);
    assert_eq!(failure.url, format!("{BASE}/tenants/current"));
    assert_eq!(failure.inner, TransportError::Connect("connection refused".to_string()));
}

#[tokio::test(start_paused = true)]
async fn get_recovers_after_transient_failures() {
    let exec = executor(ScriptedTransport::with(vec![
        refused(),
        refused(),
        ok(200, r#"{"a":1}"#),
    ]));
    let started = Instant::now();

    let result = exec.execute(&LogicalRequest::get("/applications")).await.unwrap();

    assert_eq!(result.body, json!({"a": 1}));
    assert_eq!(exec.transport().calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn non_get_methods_never_retry() {
    for request in [
        LogicalRequest::post("/applications", json!({"name": "x"})),
        LogicalRequest::put("/applications/1", json!({"name": "y"})),
        LogicalRequest::delete("/applications/1"),
    ] {
        let exec = executor(ScriptedTransport::with(vec![refused(), ok(200, "{}")]));
        let started = Instant::now();

        let err = exec.execute(&request).await.unwrap_err();

        assert_eq!(exec.transport().calls(), 1, "{}", request.method);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(matches!(err, ExecuteError::Transport(ref f) if f.attempts == 1));
    }
}

#[tokio::test(start_paused = true)]
async fn http_error_statuses_are_not_retried() {
    let exec = executor(ScriptedTransport::with(vec![
        ok(503, r#"{"message":"busy"}"#),
        ok(200, "{}"),
    ]));

    let err = exec.execute(&LogicalRequest::get("/tenants/current")).await.unwrap_err();

    assert_eq!(exec.transport().calls(), 1);
    assert_eq!(err.status(), Some(503));
}

#[tokio::test(start_paused = true)]
async fn get_times_out_after_twenty_seconds_per_attempt() {
    let exec = executor(ScriptedTransport::hanging(Duration::from_secs(60)));
    let started = Instant::now();

    let err = exec.execute(&LogicalRequest::get("/tenants/current")).await.unwrap_err();

    // Five 20s timeouts plus four 5s waits.
    assert_eq!(started.elapsed(), Duration::from_secs(120));
    assert_eq!(exec.transport().calls(), 5);
    let ExecuteError::Transport(failure) = err else {
        panic!("expected transport failure, got {err:?}");
    };
    assert_eq!(failure.inner, TransportError::Timeout);
}

#[tokio::test(start_paused = true)]
async fn post_is_not_bounded_by_the_get_timeout() {
    let mut transport = ScriptedTransport::with(vec![ok(201, r#"{"id":1}"#)]);
    transport.hang_for = Some(Duration::from_secs(60));
    let exec = executor(transport);

    let result = exec
        .execute(&LogicalRequest::post("/applications", json!({"name": "slow"})))
        .await
        .unwrap();

    assert!(result.created);
    assert_eq!(result.body["id"], 1);
}

#[tokio::test(start_paused = true)]
async fn cached_get_skips_transport_entirely() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dev-cache.json");
    std::fs::write(
        &path,
        r#"{"/applications?limit=5": {"size": 0, "items": []}}"#,
    )
    .unwrap();

    let mut config = ExecutorConfig::new(BASE);
    config.cache = CacheConfig::new(CacheMode::Dev(CacheFiles::new(&path)));
    let exec = RequestExecutor::new(&config, ScriptedTransport::default()).unwrap();

    for _ in 0..2 {
        let result = exec
            .execute(&LogicalRequest::get(format!("{BASE}/applications")).query("limit", 5u32))
            .await
            .unwrap();
        assert!(result.from_cache);
        assert_eq!(result.body["size"], 0);
    }
    assert_eq!(exec.transport().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cache_is_not_consulted_for_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dev-cache.json");
    std::fs::write(&path, r#"{"/applications": {"cached": true}}"#).unwrap();

    let mut config = ExecutorConfig::new(BASE);
    config.cache = CacheConfig::new(CacheMode::Dev(CacheFiles::new(&path)));
    let exec = RequestExecutor::new(
        &config,
        ScriptedTransport::with(vec![ok(201, r#"{"created":true}"#)]),
    )
    .unwrap();

    let result = exec
        .execute(&LogicalRequest::post("/applications", json!({"name": "n"})))
        .await
        .unwrap();
    assert!(!result.from_cache);
    assert_eq!(exec.transport().calls(), 1);
}
