//! Request authenticators.
//!
//! An `Authenticator` signs a `NormalizedRequest` in place right before it is
//! dispatched. Two schemes ship with the crate:
//!
//! - `BasicAuthenticator`: the key id and secret as HTTP basic credentials.
//! - `SignedRequestAuthenticator`: an HMAC-SHA-256 signature over a canonical
//!   form of the request, so the secret never goes over the wire.
//!
//! Which one to use is configuration (`AuthScheme`), not executor logic.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ExecuteError;
use crate::http::NormalizedRequest;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNED_ALGORITHM: &str = "RSIG1-HMAC-SHA-256";
pub const DATE_HEADER: &str = "X-Request-Date";

/// Adds credentials to a request.
pub trait Authenticator: Send + Sync + fmt::Debug {
    fn authenticate(&self, request: &mut NormalizedRequest) -> Result<(), ExecuteError>;
}

/// An API key id and its secret. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ApiKey {
    pub id: String,
    secret: String,
}

impl ApiKey {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authentication scheme selection, as it appears in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthScheme {
    #[default]
    None,
    Basic(ApiKey),
    Signed(ApiKey),
}

impl AuthScheme {
    pub fn build(&self) -> Box<dyn Authenticator> {
        match self {
            AuthScheme::None => Box::new(NoAuthenticator),
            AuthScheme::Basic(key) => Box::new(BasicAuthenticator::new(key.clone())),
            AuthScheme::Signed(key) => Box::new(SignedRequestAuthenticator::new(key.clone())),
        }
    }
}

/// Leaves requests untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthenticator;

impl Authenticator for NoAuthenticator {
    fn authenticate(&self, _request: &mut NormalizedRequest) -> Result<(), ExecuteError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BasicAuthenticator {
    key: ApiKey,
}

impl BasicAuthenticator {
    pub fn new(key: ApiKey) -> Self {
        Self { key }
    }
}

impl Authenticator for BasicAuthenticator {
    fn authenticate(&self, request: &mut NormalizedRequest) -> Result<(), ExecuteError> {
        let credentials = format!("{}:{}", self.key.id, self.key.secret);
        let encoded = general_purpose::STANDARD.encode(credentials);
        request.set_header("Authorization", format!("Basic {encoded}"));
        Ok(())
    }
}

/// Signs the canonical request with a key derived from the secret, the
/// request date and a per-request nonce.
#[derive(Debug, Clone)]
pub struct SignedRequestAuthenticator {
    key: ApiKey,
}

impl SignedRequestAuthenticator {
    pub fn new(key: ApiKey) -> Self {
        Self { key }
    }

    pub(crate) fn sign_at(
        &self,
        request: &mut NormalizedRequest,
        now: DateTime<Utc>,
        nonce: &str,
    ) -> Result<(), ExecuteError> {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        request.set_header(DATE_HEADER, timestamp.as_str());

        let (signed_headers, canonical_headers) = canonical_headers(request);
        let canonical = [
            request.method.as_str().to_string(),
            canonical_path(request),
            request.query_string(),
            canonical_headers,
            signed_headers.clone(),
            hex::encode(Sha256::digest(request.body.as_deref().unwrap_or_default())),
        ]
        .join("\n");

        let scope = format!("{date}/{nonce}/request");
        let string_to_sign = format!(
            "{SIGNED_ALGORITHM}\n{timestamp}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let secret_key = hmac_sha256(format!("RSIG1{}", self.key.secret).as_bytes(), date.as_bytes())?;
        let nonce_key = hmac_sha256(&secret_key, nonce.as_bytes())?;
        let signing_key = hmac_sha256(&nonce_key, b"request")?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        request.set_header(
            "Authorization",
            format!(
                "{SIGNED_ALGORITHM} credential={}/{scope}, signedHeaders={signed_headers}, signature={signature}",
                self.key.id
            ),
        );
        Ok(())
    }
}

impl Authenticator for SignedRequestAuthenticator {
    fn authenticate(&self, request: &mut NormalizedRequest) -> Result<(), ExecuteError> {
        let nonce = Uuid::new_v4().to_string();
        self.sign_at(request, Utc::now(), &nonce)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ExecuteError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| ExecuteError::Auth(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn host_header(request: &NormalizedRequest) -> String {
    let host = request.url.host_str().unwrap_or_default();
    match request.url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn canonical_path(request: &NormalizedRequest) -> String {
    match request.url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}

/// Signed header names (`a;b;c`) and their `name:value\n` block, both sorted
/// by lowercase name. The host comes from the URL, which every transport
/// sends as the `Host` header.
fn canonical_headers(request: &NormalizedRequest) -> (String, String) {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(DATE_HEADER))
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), host_header(request)));
    headers.sort();

    let names = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let block = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    (names, block)
}
