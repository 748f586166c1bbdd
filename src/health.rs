//! Health, metrics and config introspection endpoints.
//!
//! The root path doubles as the health check (the browser UI and load
//! balancers both probe `/`); `/metrics` exposes per-endpoint statistics and
//! the session counters; `/config` returns the active configuration with the
//! upstream credential redacted.

use crate::error::GatewayError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model_name": config.openai.default_model,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "transcribe-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": metrics.active_sessions,
            "started": metrics.sessions_started,
            "upstream_failures": metrics.upstream_failures
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "average_duration_ms": metric.average_duration_ms(),
            "error_rate": metric.error_rate()
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "totals": {
            "request_count": metrics.request_count,
            "error_count": metrics.error_count,
            "active_sessions": metrics.active_sessions,
            "sessions_started": metrics.sessions_started,
            "upstream_failures": metrics.upstream_failures
        },
        "endpoints": endpoint_stats
    }))
}

/// Read-only view of the active configuration. The API key never leaves the
/// process; only its presence is reported.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, GatewayError> {
    let config = state.get_config();
    let turn_detection = serde_json::to_value(&config.openai.turn_detection)?;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "openai": {
                "api_key_configured": !config.openai.api_key.is_empty(),
                "default_model": config.openai.default_model,
                "realtime_url": config.openai.realtime_url,
                "sessions_url": config.openai.sessions_url,
                "turn_detection": turn_detection,
                "noise_reduction": config.openai.noise_reduction
            },
            "liveness": {
                "sweep_interval_secs": config.liveness.sweep_interval_secs
            }
        }
    })))
}
