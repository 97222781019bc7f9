//! Maps an `HttpResponse` to a success payload or a `ResourceError`.

use serde_json::{json, Value};

use crate::error::{ExecuteError, RequestContext, ResourceError};
use crate::http::HttpResponse;

/// Successful outcome of `execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub body: Value,
    /// The server answered 201 Created.
    pub created: bool,
    /// The server answered 202 Accepted without a body; `body` is
    /// `{"accepted": true}`.
    pub accepted: bool,
    /// Served from the response cache without touching the network.
    pub from_cache: bool,
}

impl ExecutionResult {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            created: false,
            accepted: false,
            from_cache: false,
        }
    }

    pub(crate) fn cached(body: Value) -> Self {
        Self {
            from_cache: true,
            ..Self::new(body)
        }
    }
}

pub fn interpret(
    response: &HttpResponse,
    context: RequestContext,
) -> Result<ExecutionResult, ExecuteError> {
    let status = response.status;
    let empty = response.body.trim().is_empty();

    if status > 399 {
        let body = if empty {
            json!({ "status": status })
        } else {
            serde_json::from_str(&response.body)
                .unwrap_or_else(|_| json!({ "status": status, "message": response.body.as_str() }))
        };
        return Err(ResourceError {
            status,
            body,
            context,
        }
        .into());
    }

    if status == 202 && empty {
        return Ok(ExecutionResult {
            accepted: true,
            ..ExecutionResult::new(json!({ "accepted": true }))
        });
    }

    let body = if empty {
        Value::Null
    } else {
        serde_json::from_str(&response.body).map_err(|e| ExecuteError::Deserialization {
            url: context.url.clone(),
            message: e.to_string(),
        })?
    };

    Ok(ExecutionResult {
        created: status == 201,
        ..ExecutionResult::new(body)
    })
}
