//! The request executor.
//!
//! # Data Flow
//! ```text
//! LogicalRequest
//!     → Normalizer        (path, query, body encoding, headers)
//!     → CacheStore lookup (GET only; a hit returns without any I/O)
//!     → Authenticator     (signs the normalized request in place)
//!     → Transport         (GET bounded by the configured timeout)
//!         ↺ RetryState    (transport failures on GET, fixed delay)
//!     → interpret         (status code → result or ResourceError)
//!     → CacheStore put    (auto-cache mode, allow-listed GETs)
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::cache::CacheStore;
use crate::config::ExecutorConfig;
use crate::error::{ConfigError, ExecuteError, RequestContext, TransportError, TransportFailure};
use crate::http::{HttpResponse, NormalizedRequest, Transport};
use crate::interpret::{interpret, ExecutionResult};
use crate::normalize::Normalizer;
use crate::observe::{CallObserver, MetricsObserver};
use crate::request::LogicalRequest;
use crate::retry::{RetryPolicy, RetryState};

/// Executes calls against the resource API.
///
/// Share it behind an `Arc`; calls do not block each other; the only state
/// they share is the response cache.
pub struct RequestExecutor<T> {
    normalizer: Normalizer,
    authenticator: Box<dyn Authenticator>,
    transport: T,
    cache: CacheStore,
    retry: RetryPolicy,
    observer: Arc<dyn CallObserver>,
}

impl<T: Transport> RequestExecutor<T> {
    /// Build from configuration. Fails if the base URL is invalid or a
    /// required cache file is missing or malformed.
    pub fn new(config: &ExecutorConfig, transport: T) -> Result<Self, ConfigError> {
        Ok(Self {
            normalizer: Normalizer::new(config)?,
            authenticator: config.auth.build(),
            transport,
            cache: CacheStore::load(&config.cache)?,
            retry: config.retry,
            observer: Arc::new(MetricsObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Box<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute one logical call. Retries are invisible to the caller: the
    /// returned future resolves once, with the final outcome.
    pub async fn execute(&self, request: &LogicalRequest) -> Result<ExecutionResult, ExecuteError> {
        let normalized = self.normalizer.normalize(request)?;
        self.dispatch(normalized).await
    }

    /// Callback flavour of `execute`, for callers outside async code.
    ///
    /// The request is validated before anything is spawned, so an invalid
    /// request is reported here and `callback` is never called. Otherwise
    /// the call runs on the current tokio runtime and `callback` fires
    /// exactly once with the outcome.
    pub fn spawn_execute<F>(
        self: &Arc<Self>,
        request: &LogicalRequest,
        callback: F,
    ) -> Result<JoinHandle<()>, ExecuteError>
    where
        T: 'static,
        F: FnOnce(Result<ExecutionResult, ExecuteError>) + Send + 'static,
    {
        let normalized = self.normalizer.normalize(request)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = this.dispatch(normalized).await;
            callback(outcome);
        }))
    }

    async fn dispatch(
        &self,
        mut request: NormalizedRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        let method = request.method;
        let key = request.cache_key();

        if method.is_idempotent() {
            if let Some(body) = self.cache.lookup(&key) {
                debug!(%key, "serving response from cache");
                self.observer.on_cache_hit(&key);
                return Ok(ExecutionResult::cached(body));
            }
        }

        self.authenticator.authenticate(&mut request)?;
        let context = RequestContext {
            url: request.full_url(),
            method,
        };

        let response = self.send_with_retry(&request, &context).await?;
        let result = interpret(&response, context)?;

        if self.cache.put(method, &request.path, &key, &result.body) {
            debug!(%key, "cached response");
        }
        Ok(result)
    }

    async fn send_with_retry(
        &self,
        request: &NormalizedRequest,
        context: &RequestContext,
    ) -> Result<HttpResponse, TransportFailure> {
        let mut state = RetryState::initial();
        let mut last_error = TransportError::Other("no attempt made".to_string());

        loop {
            match state {
                RetryState::Attempt(attempt) => match self.invoke(request, &context.url, attempt).await {
                    Ok(response) => return Ok(response),
                    Err(err) => {
                        state = state.on_failure(&self.retry, request.method);
                        last_error = err;
                    }
                },
                RetryState::RetryWait(attempt) => {
                    warn!(
                        method = %request.method,
                        url = %context.url,
                        attempt,
                        error = %last_error,
                        delay_ms = self.retry.delay_ms,
                        "transport failure, retrying"
                    );
                    self.observer.on_retry(request.method, &context.url, attempt);
                    tokio::time::sleep(self.retry.delay()).await;
                    state = state.on_delay_elapsed();
                }
                RetryState::Failed(attempts) => {
                    warn!(
                        method = %request.method,
                        url = %context.url,
                        attempts,
                        error = %last_error,
                        "transport failure, giving up"
                    );
                    return Err(TransportFailure {
                        method: request.method,
                        url: context.url.clone(),
                        attempts,
                        inner: last_error,
                    });
                }
            }
        }
    }

    async fn invoke(
        &self,
        request: &NormalizedRequest,
        url: &str,
        attempt: u32,
    ) -> Result<HttpResponse, TransportError> {
        info!(method = %request.method, url, attempt, "dispatching request");
        self.observer.on_dispatch(request.method, url, attempt);

        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(request))
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.transport.send(request).await,
        }
    }
}
