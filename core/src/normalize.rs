//! Turns a `LogicalRequest` into a transport-ready `NormalizedRequest`.
//!
//! # Design
//! `Normalizer` holds only the immutable per-executor settings (base URL,
//! default headers, User-Agent, GET timeout). `normalize` borrows the
//! caller's request and builds a fresh value, so the same `LogicalRequest`
//! can be executed any number of times.

use std::time::Duration;

use serde_json::Value;
use url::form_urlencoded;
use url::Url;

use crate::config::ExecutorConfig;
use crate::error::{ConfigError, ExecuteError};
use crate::http::{BodyEncoding, HttpMethod, NormalizedRequest};
use crate::request::{LogicalRequest, RequestBody};

/// Field holding a resource's own URL; the server rejects it in write bodies.
const SELF_LINK_FIELD: &str = "href";

#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Base URL serialized without a trailing slash.
    base_prefix: String,
    default_headers: Vec<(String, String)>,
    user_agent: String,
    strip_self_link: bool,
    get_timeout: Duration,
}

impl Normalizer {
    pub fn new(config: &ExecutorConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;
        let base_prefix = base_url.as_str().trim_end_matches('/').to_string();
        Ok(Self {
            base_prefix,
            default_headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            user_agent: user_agent(config.user_agent.as_deref()),
            strip_self_link: config.strip_self_link,
            get_timeout: config.get_timeout(),
        })
    }

    pub fn normalize(&self, request: &LogicalRequest) -> Result<NormalizedRequest, ExecuteError> {
        let uri = request.uri.trim();
        if uri.is_empty() {
            return Err(ExecuteError::InvalidArgument(
                "request uri is required".to_string(),
            ));
        }

        let mut url = self.resolve(uri)?;
        let mut query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.set_query(None);
        url.set_fragment(None);
        for (key, value) in &request.query {
            query.retain(|(k, _)| k != key);
            query.push((key.clone(), value.to_string()));
        }
        query.sort();

        let path = self.relative_path(&url);

        let mut normalized = NormalizedRequest {
            method: request.method,
            url,
            path,
            query,
            headers: self.default_headers.clone(),
            body: None,
            encoding: None,
            timeout: (request.method == HttpMethod::Get).then_some(self.get_timeout),
        };
        normalized.set_header("Accept", "application/json");
        normalized.set_header("User-Agent", self.user_agent.as_str());

        if let Some(body) = &request.body {
            let (encoded, encoding) = self.encode_body(body)?;
            normalized.set_header("Content-Type", encoding.content_type());
            normalized.body = Some(encoded);
            normalized.encoding = Some(encoding);
        }

        for (name, value) in &request.headers {
            normalized.set_header(name, value.as_str());
        }
        Ok(normalized)
    }

    fn resolve(&self, uri: &str) -> Result<Url, ExecuteError> {
        let invalid = |e: url::ParseError| ExecuteError::InvalidArgument(format!("invalid uri `{uri}`: {e}"));
        match Url::parse(uri) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let joined = if uri.starts_with('/') {
                    format!("{}{uri}", self.base_prefix)
                } else {
                    format!("{}/{uri}", self.base_prefix)
                };
                Url::parse(&joined).map_err(invalid)
            }
            Err(e) => Err(invalid(e)),
        }
    }

    /// Strip the base URL when `url` lives under it; keep the full URL
    /// otherwise.
    fn relative_path(&self, url: &Url) -> String {
        let full = url.as_str();
        match full.strip_prefix(&self.base_prefix) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => full.to_string(),
        }
    }

    fn encode_body(&self, body: &RequestBody) -> Result<(String, BodyEncoding), ExecuteError> {
        match body {
            RequestBody::Form(fields) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                Ok((encoded, BodyEncoding::Form))
            }
            RequestBody::Json(value) => {
                let encoded = match value {
                    Value::Object(map) if self.strip_self_link && map.contains_key(SELF_LINK_FIELD) => {
                        let mut map = map.clone();
                        map.remove(SELF_LINK_FIELD);
                        serde_json::to_string(&map)
                    }
                    _ => serde_json::to_string(value),
                }
                .map_err(|e| ExecuteError::Serialization(e.to_string()))?;
                Ok((encoded, BodyEncoding::Json))
            }
        }
    }
}

/// `[prefix ]<crate>/<version> rust <os>/<arch>`
fn user_agent(prefix: Option<&str>) -> String {
    let ident = format!(
        "{}/{} rust {}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix} {ident}"),
        None => ident,
    }
}
