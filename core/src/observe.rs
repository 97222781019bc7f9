//! Call-volume observability.
//!
//! The executor reports dispatches, retries and cache hits to an injected
//! `CallObserver` instead of bumping process-wide counters. The default
//! `MetricsObserver` forwards to the `metrics` facade, so whichever recorder
//! the application installs (Prometheus exporter, none at all) picks them up.
//!
//! # Metrics
//! - `resource_api_calls_total` (counter): dispatched attempts, by method
//! - `resource_api_retries_total` (counter): scheduled retries, by method
//! - `resource_api_cache_hits_total` (counter): calls answered from cache

use crate::http::HttpMethod;

pub trait CallObserver: Send + Sync {
    /// An attempt is about to go over the network.
    fn on_dispatch(&self, _method: HttpMethod, _url: &str, _attempt: u32) {}

    /// A failed attempt will be retried after the policy delay.
    fn on_retry(&self, _method: HttpMethod, _url: &str, _attempt: u32) {}

    fn on_cache_hit(&self, _key: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl CallObserver for MetricsObserver {
    fn on_dispatch(&self, method: HttpMethod, _url: &str, _attempt: u32) {
        metrics::counter!("resource_api_calls_total", "method" => method.as_str()).increment(1);
    }

    fn on_retry(&self, method: HttpMethod, _url: &str, _attempt: u32) {
        metrics::counter!("resource_api_retries_total", "method" => method.as_str()).increment(1);
    }

    fn on_cache_hit(&self, _key: &str) {
        metrics::counter!("resource_api_cache_hits_total").increment(1);
    }
}
