//! # Application State Management
//!
//! Shared state that every HTTP request handler and WebSocket session can
//! access. The gateway is constructed exactly once at process start and this
//! struct is injected into the connection-accept path via `web::Data` — there
//! is no ambient global.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: multiple handlers hold a reference to the same state
//! - **RwLock**: many concurrent readers OR one writer
//! - Reading is the common case (config lookups per connection); writes are
//!   rare (metric increments are short, config never changes after load)
//!
//! The `reqwest::Client` lives here so its connection pool is built once and
//! reused by every token-minting request.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all handlers and sessions.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway configuration, loaded once at startup
    pub config: Arc<RwLock<AppConfig>>,

    /// Gateway metrics (constantly being updated by requests and sessions)
    pub metrics: Arc<RwLock<GatewayMetrics>>,

    /// Shared HTTP client used for ephemeral token minting
    pub http: reqwest::Client,

    /// When the server started (never changes, safe to share directly)
    pub start_time: Instant,
}

/// Metrics collected across all HTTP requests and transcription sessions.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: HTTP surface load and reliability
/// - **active_sessions**: currently connected WebSocket clients
/// - **sessions_started**: sessions that successfully bridged to the upstream
/// - **upstream_failures**: token minting or upstream-open failures
/// - **endpoint_metrics**: per-endpoint latency and error statistics
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP errors since server start
    pub error_count: u64,

    /// Current number of connected transcription clients
    pub active_sessions: u32,

    /// Sessions that successfully established an upstream connection
    pub sessions_started: u64,

    /// Failed attempts to mint a token or open the upstream connection
    pub upstream_failures: u64,

    /// Detailed metrics for each endpoint, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create the gateway state from the loaded configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(GatewayMetrics::default())),
            http: reqwest::Client::new(),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other threads aren't
    /// blocked; `AppConfig` is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Increment the total request counter (called by middleware).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A client connected to the transcription endpoint.
    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    /// A transcription client disconnected.
    ///
    /// Includes an underflow guard: u32 would panic if a decrement ever ran
    /// without a matching increment.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// A session successfully bridged to the upstream transcription service.
    pub fn record_session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.sessions_started += 1;
    }

    /// Token minting or the upstream connection failed during session setup.
    pub fn record_upstream_failure(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.upstream_failures += 1;
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones under a read lock so the data is consistent and the lock is not
    /// held during HTTP response generation.
    pub fn get_metrics_snapshot(&self) -> GatewayMetrics {
        let metrics = self.metrics.read().unwrap();
        GatewayMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            sessions_started: metrics.sessions_started,
            upstream_failures: metrics.upstream_failures,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_session_counters() {
        let state = AppState::new(AppConfig::default());

        state.increment_active_sessions();
        state.increment_active_sessions();
        state.decrement_active_sessions();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_sessions, 1);

        // The guard keeps the counter at zero even on unbalanced decrements
        state.decrement_active_sessions();
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());

        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = snapshot.endpoint_metrics.get("GET /health").unwrap();
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.error_count, 1);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
