//! # Configuration Management
//!
//! This module handles loading and managing gateway configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_OPENAI_DEFAULT_MODEL, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! A few variables are special-cased because deployment platforms and the
//! OpenAI tooling ecosystem expect them without the APP_ prefix:
//! `HOST`, `PORT` and `OPENAI_API_KEY`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main gateway configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, openai, liveness)
/// makes it easier to understand and maintain as the gateway grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub liveness: LivenessConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream transcription service configuration.
///
/// ## Fields:
/// - `api_key`: long-lived OpenAI API key, exchanged per session for an
///   ephemeral token (never sent to browsers)
/// - `default_model`: transcription model used when the client's start
///   command does not name one
/// - `realtime_url`: WebSocket endpoint of the Realtime API
/// - `sessions_url`: HTTP endpoint that mints ephemeral session tokens
/// - `turn_detection`: server-side voice activity detection parameters sent
///   in the session configuration message
/// - `noise_reduction`: noise reduction profile ("near_field" or "far_field")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub default_model: String,
    pub realtime_url: String,
    pub sessions_url: String,
    pub turn_detection: TurnDetectionConfig,
    pub noise_reduction: String,
}

/// Server-side voice activity detection tuning.
///
/// ## Tuning guidelines:
/// - Higher `threshold`: fewer false speech starts in noisy rooms
/// - Larger `prefix_padding_ms`: keeps more audio before detected speech
/// - Larger `silence_duration_ms`: waits longer before finalizing an utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDetectionConfig {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// Client liveness detection configuration.
///
/// Each connected client is swept on this interval: unresponsive connections
/// are terminated, responsive ones receive a fresh ping. A client that never
/// answers is reaped within two sweep intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    pub sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            openai: OpenAiConfig {
                api_key: String::new(), // must come from OPENAI_API_KEY
                default_model: "gpt-4o-transcribe".to_string(),
                realtime_url: "wss://api.openai.com/v1/realtime?intent=transcription"
                    .to_string(),
                sessions_url: "https://api.openai.com/v1/realtime/sessions".to_string(),
                turn_detection: TurnDetectionConfig {
                    threshold: 0.5,
                    prefix_padding_ms: 300,
                    silence_duration_ms: 500,
                },
                noise_reduction: "near_field".to_string(),
            },
            liveness: LivenessConfig {
                sweep_interval_secs: 30,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and OPENAI_API_KEY
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_OPENAI_DEFAULT_MODEL=gpt-4o-mini-transcribe`: Override model
    /// - `APP_LIVENESS_SWEEP_INTERVAL_SECS=10`: Override sweep interval
    /// - `OPENAI_API_KEY=sk-...`: Long-lived upstream credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // The upstream credential follows the OpenAI SDK convention
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("openai.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be used)
    /// - A default transcription model is configured
    /// - Upstream endpoints are non-empty
    /// - The liveness sweep interval is non-zero (a zero interval would reap
    ///   every connection immediately)
    ///
    /// Note that an empty API key is allowed here: the gateway can start
    /// without one, but every session start will fail at token minting.
    /// `main` logs a prominent warning for that case instead.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.openai.default_model.is_empty() {
            return Err(anyhow::anyhow!("Default transcription model must be set"));
        }

        if self.openai.realtime_url.is_empty() || self.openai.sessions_url.is_empty() {
            return Err(anyhow::anyhow!("Upstream endpoints must be set"));
        }

        if self.liveness.sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "Liveness sweep interval must be greater than 0"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The default configuration is valid and points at the real upstream.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.openai.default_model, "gpt-4o-transcribe");
        assert!(config.openai.realtime_url.starts_with("wss://"));
        assert_eq!(config.liveness.sweep_interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    /// Validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.openai.default_model = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.liveness.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    /// A missing API key is not a validation error; session starts report it.
    #[test]
    fn test_empty_api_key_is_allowed() {
        let config = AppConfig::default();
        assert!(config.openai.api_key.is_empty());
        assert!(config.validate().is_ok());
    }
}
