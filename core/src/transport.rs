//! `Transport` backed by ureq.
//!
//! ureq is blocking, so each call runs on tokio's blocking pool. The agent is
//! configured to hand back 4xx/5xx responses as data; status interpretation
//! belongs to the executor.
//!
//! A request timeout is also handed to ureq as its global timeout: dropping
//! the `spawn_blocking` handle does not stop the blocking call.

use std::io;

use tokio::task;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpResponse, NormalizedRequest, Transport};

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    async fn send(&self, request: &NormalizedRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let request = request.clone();
        task::spawn_blocking(move || call(&agent, &request))
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?
    }
}

fn call(agent: &ureq::Agent, request: &NormalizedRequest) -> Result<HttpResponse, TransportError> {
    let url = request.full_url();
    let body = request.body.as_deref().map(str::as_bytes);

    let result = match request.method {
        HttpMethod::Get => prepare(agent.get(&url), request).call(),
        HttpMethod::Delete => prepare(agent.delete(&url), request).call(),
        HttpMethod::Post => {
            let builder = prepare(agent.post(&url), request);
            match body {
                Some(bytes) => builder.send(bytes),
                None => builder.send_empty(),
            }
        }
        HttpMethod::Put => {
            let builder = prepare(agent.put(&url), request);
            match body {
                Some(bytes) => builder.send(bytes),
                None => builder.send_empty(),
            }
        }
    };

    let mut response = result.map_err(map_error)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| TransportError::Io(e.to_string()))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &NormalizedRequest,
) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if request.timeout.is_some() {
        builder = builder.config().timeout_global(request.timeout).build();
    }
    builder
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            TransportError::Connect(e.to_string())
        }
        ureq::Error::Io(e) => TransportError::Io(e.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}
