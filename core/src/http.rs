//! HTTP transport types and the transport capability.
//!
//! # Design
//! These types describe a transport-ready request and the raw response as
//! plain data. The executor never opens sockets itself; it hands a
//! `NormalizedRequest` to whatever `Transport` it was built with and gets an
//! `HttpResponse` (or a `TransportError`) back. Tests swap in scripted
//! transports, production code uses `UreqTransport`.
//!
//! Headers and query pairs use owned `Vec<(String, String)>` so the
//! authenticator can append to them in place.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use url::Url;

use crate::error::TransportError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Only GET is safe to replay after a transport failure.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the request body was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
}

impl BodyEncoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyEncoding::Json => "application/json",
            BodyEncoding::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// A fully resolved, transport-ready request.
///
/// Built by `Normalizer::normalize` and then signed in place by an
/// `Authenticator`. Lives for a single `execute` call.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub method: HttpMethod,
    /// Absolute target URL without its query string.
    pub url: Url,
    /// Base-relative path when the target is on the configured host,
    /// otherwise the full URL.
    pub path: String,
    /// Query pairs, sorted by key.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub encoding: Option<BodyEncoding>,
    pub timeout: Option<Duration>,
}

impl NormalizedRequest {
    /// `application/x-www-form-urlencoded` rendering of `query`.
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish()
    }

    /// The URL the transport should hit, query string included.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.to_string();
        }
        format!("{}?{}", self.url, self.query_string())
    }

    /// Key under which a GET response for this request is cached.
    pub fn cache_key(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        format!("{}?{}", self.path, self.query_string())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any existing header with the same name (case-insensitive).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Generic HTTP client capability.
///
/// Implementations return 4xx/5xx responses as `Ok`; only failures to get a
/// response at all (refused connection, DNS, I/O) are `Err`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &NormalizedRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, query: &[(&str, &str)]) -> NormalizedRequest {
        NormalizedRequest {
            method: HttpMethod::Get,
            url: Url::parse(&format!("https://api.example.com/v1{path}")).unwrap(),
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers: Vec::new(),
            body: None,
            encoding: None,
            timeout: None,
        }
    }

    #[test]
    fn cache_key_without_query_is_the_path() {
        assert_eq!(request("/tenants/current", &[]).cache_key(), "/tenants/current");
    }

    #[test]
    fn cache_key_appends_encoded_query() {
        let req = request("/applications", &[("limit", "25"), ("name", "my app")]);
        assert_eq!(req.cache_key(), "/applications?limit=25&name=my+app");
        assert_eq!(
            req.full_url(),
            "https://api.example.com/v1/applications?limit=25&name=my+app"
        );
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut req = request("/x", &[]);
        req.set_header("Authorization", "a");
        req.set_header("authorization", "b");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("AUTHORIZATION"), Some("b"));
    }

    #[test]
    fn only_get_is_idempotent() {
        assert!(HttpMethod::Get.is_idempotent());
        assert!(!HttpMethod::Post.is_idempotent());
        assert!(!HttpMethod::Put.is_idempotent());
        assert!(!HttpMethod::Delete.is_idempotent());
    }

    #[test]
    fn method_deserializes_from_uppercase() {
        let m: HttpMethod = serde_json::from_str(r#""DELETE""#).unwrap();
        assert_eq!(m, HttpMethod::Delete);
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }
}
