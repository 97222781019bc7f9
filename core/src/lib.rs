//! HTTP request executor for a remote REST resource API.
//!
//! # Overview
//! Every network call an application makes to the resource API goes through
//! `RequestExecutor::execute`. The executor resolves the URL against the
//! configured base, encodes the query and body, signs the request, sends it
//! through a pluggable `Transport`, retries transport failures on GET, and
//! turns the status code into an `ExecutionResult` or an `ExecuteError`.
//!
//! # Design
//! - The executor never touches sockets; `Transport` is the I/O boundary.
//!   `UreqTransport` is the stock implementation, tests script their own.
//! - Authentication is a trait object chosen by configuration
//!   (`AuthScheme`): HTTP basic or HMAC-signed canonical requests.
//! - An optional JSON file cache short-circuits GETs during development and
//!   can record new responses in auto-cache mode.
//! - Call volume is reported to an injectable `CallObserver` rather than
//!   global counters.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod interpret;
pub mod normalize;
pub mod observe;
pub mod request;
pub mod retry;
pub mod transport;

pub use auth::{ApiKey, AuthScheme, Authenticator, BasicAuthenticator, SignedRequestAuthenticator};
pub use cache::{CacheConfig, CacheFiles, CacheMode, CacheStore};
pub use config::ExecutorConfig;
pub use error::{ConfigError, ExecuteError, RequestContext, ResourceError, TransportError, TransportFailure};
pub use executor::RequestExecutor;
pub use http::{BodyEncoding, HttpMethod, HttpResponse, NormalizedRequest, Transport};
pub use interpret::ExecutionResult;
pub use observe::{CallObserver, MetricsObserver};
pub use request::{LogicalRequest, QueryValue, RequestBody};
pub use retry::{RetryPolicy, RetryState};
pub use transport::UreqTransport;
