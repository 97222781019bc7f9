//! Error types for the request executor.
//!
//! # Design
//! Construction problems (`ConfigError`) are returned from constructors and
//! are fatal for the executor. Everything that can go wrong during a single
//! call lands in `ExecuteError`. Transport failures keep the last underlying
//! `TransportError` as their source, and resource errors keep the server's
//! body plus the method and URL that produced it.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

use crate::http::HttpMethod;

/// Errors raised while building an executor.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no cache file found at {}{}", primary.display(), fallback_suffix(fallback))]
    CacheFileMissing {
        primary: PathBuf,
        fallback: Option<PathBuf>,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache file {} must contain a JSON object", path.display())]
    CacheShape { path: PathBuf },

    #[error("invalid cacheable uri pattern `{0}`")]
    InvalidPattern(String),
}

fn fallback_suffix(fallback: &Option<PathBuf>) -> String {
    match fallback {
        Some(path) => format!(" or {}", path.display()),
        None => String::new(),
    }
}

/// A failure to obtain any HTTP response at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport i/o failed: {0}")]
    Io(String),

    #[error("transport failed: {0}")]
    Other(String),
}

/// The method and URL of the request that produced an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub url: String,
    pub method: HttpMethod,
}

/// A response with status >= 400.
#[derive(Debug, Clone, Error)]
#[error("{} {} returned HTTP {status}", context.method, context.url)]
pub struct ResourceError {
    pub status: u16,
    /// Server-provided error body, or `{"status": <code>}` when it sent none.
    pub body: Value,
    pub context: RequestContext,
}

impl ResourceError {
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// Service-specific error code, when the body carries one.
    pub fn code(&self) -> Option<i64> {
        self.body.get("code").and_then(Value::as_i64)
    }
}

/// Transport failure surfaced after the retry budget is spent (or at once
/// for non-GET requests).
#[derive(Debug, Clone, Error)]
#[error("{method} {url} failed after {attempts} attempt(s)")]
pub struct TransportFailure {
    pub method: HttpMethod,
    pub url: String,
    pub attempts: u32,
    #[source]
    pub inner: TransportError,
}

/// Errors returned by `RequestExecutor::execute`.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The request was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] TransportFailure),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request body could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A success response carried a body that is not JSON.
    #[error("response from {url} is not valid JSON: {message}")]
    Deserialization { url: String, message: String },
}

impl ExecuteError {
    /// HTTP status for resource errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecuteError::Resource(err) => Some(err.status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use serde_json::json;

    use super::*;

    #[test]
    fn resource_error_exposes_message_and_code() {
        let err = ResourceError {
            status: 404,
            body: json!({"status": 404, "code": 404, "message": "not here"}),
            context: RequestContext {
                url: "https://api.example.com/v1/applications/1".to_string(),
                method: HttpMethod::Get,
            },
        };
        assert_eq!(err.message(), Some("not here"));
        assert_eq!(err.code(), Some(404));
        assert_eq!(
            err.to_string(),
            "GET https://api.example.com/v1/applications/1 returned HTTP 404"
        );
    }

    #[test]
    fn transport_failure_keeps_inner_cause() {
        let err = ExecuteError::from(TransportFailure {
            method: HttpMethod::Post,
            url: "https://api.example.com/v1/tasks".to_string(),
            attempts: 1,
            inner: TransportError::Connect("refused".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "POST https://api.example.com/v1/tasks failed after 1 attempt(s)"
        );
        let source = err.source().expect("inner cause");
        assert_eq!(source.to_string(), "connection failed: refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn missing_cache_file_names_both_locations() {
        let err = ConfigError::CacheFileMissing {
            primary: PathBuf::from("/a/cache.json"),
            fallback: Some(PathBuf::from("/b/cache.json")),
        };
        assert_eq!(
            err.to_string(),
            "no cache file found at /a/cache.json or /b/cache.json"
        );
    }
}
