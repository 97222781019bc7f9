//! Retry policy for transport failures.
//!
//! # State Transitions
//! ```text
//! Attempt(n) ──ok──────────────────────────────> response handed to the interpreter
//! Attempt(n) ──err, GET and n < max──> RetryWait(n) ──delay──> Attempt(n + 1)
//! Attempt(n) ──err, otherwise────────> Failed(n)
//! ```
//!
//! Only transport failures move the machine. HTTP error statuses are a
//! response like any other and never come back here.

use std::time::Duration;

use serde::Deserialize;

use crate::http::HttpMethod;

/// Bounded, fixed-interval retry for idempotent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempt(u32),
    RetryWait(u32),
    Failed(u32),
}

impl RetryState {
    pub fn initial() -> Self {
        RetryState::Attempt(1)
    }

    /// Transition taken when the current attempt produced no response.
    pub fn on_failure(self, policy: &RetryPolicy, method: HttpMethod) -> Self {
        match self {
            RetryState::Attempt(n) if method.is_idempotent() && n < policy.max_attempts => {
                RetryState::RetryWait(n)
            }
            RetryState::Attempt(n) => RetryState::Failed(n),
            other => other,
        }
    }

    /// Transition taken once the retry delay has elapsed.
    pub fn on_delay_elapsed(self) -> Self {
        match self {
            RetryState::RetryWait(n) => RetryState::Attempt(n + 1),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_five_attempts_five_seconds_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    fn get_walks_through_every_attempt_then_fails() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::initial();
        let mut attempts = Vec::new();
        loop {
            match state {
                RetryState::Attempt(n) => {
                    attempts.push(n);
                    state = state.on_failure(&policy, HttpMethod::Get);
                }
                RetryState::RetryWait(_) => state = state.on_delay_elapsed(),
                RetryState::Failed(n) => {
                    assert_eq!(n, 5);
                    break;
                }
            }
        }
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn non_get_methods_fail_on_first_error() {
        let policy = RetryPolicy::default();
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete] {
            assert_eq!(
                RetryState::initial().on_failure(&policy, method),
                RetryState::Failed(1)
            );
        }
    }

    #[test]
    fn single_attempt_policy_never_waits() {
        let policy = RetryPolicy {
            max_attempts: 1,
            delay_ms: 10,
        };
        assert_eq!(
            RetryState::initial().on_failure(&policy, HttpMethod::Get),
            RetryState::Failed(1)
        );
    }

    #[test]
    fn partial_policy_fills_in_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay_ms, 5_000);
    }
}
