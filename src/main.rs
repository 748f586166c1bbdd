//! # Transcribe Gateway - Main Application Entry Point
//!
//! This is the main entry point for the realtime transcription gateway.
//! It sets up an Actix-web HTTP server that:
//!
//! - accepts browser WebSocket connections at `/v1/transcriptions` and
//!   bridges each one to the OpenAI Realtime API (see `websocket`)
//! - mints a short-lived upstream token per session instead of ever exposing
//!   the long-lived API key (see `openai::token`)
//! - serves the microphone capture page from `/static`
//! - exposes `/health`, `/metrics` and `/config` for operations
//!
//! ## Application Architecture:
//! - **config**: configuration management (TOML files + environment variables)
//! - **state**: shared gateway state, metrics, and the outbound HTTP client
//! - **error**: custom error types and HTTP error responses
//! - **middleware**: request logging and per-endpoint metrics
//! - **protocol**: the client-facing WebSocket vocabulary
//! - **session**: the per-client session state machine
//! - **websocket**: the session bridge actor (one per connection)
//! - **openai**: upstream collaborators (token minter, realtime connector,
//!   event translator)

mod config;
mod error;
mod health;
mod middleware;
mod openai;
mod protocol;
mod session;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handlers and polled by main.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. Loads configuration from files and environment variables
/// 2. Sets up structured logging
/// 3. Creates the shared gateway state (constructed exactly once here and
///    injected into the connection-accept path — no ambient globals)
/// 4. Configures the HTTP server with middleware and routes
/// 5. Handles graceful shutdown when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting transcribe-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}, model {}",
        config.server.host, config.server.port, config.openai.default_model
    );

    if config.openai.api_key.is_empty() {
        // The server still starts so health checks pass, but every session
        // start will fail at token minting until the key is provided.
        warn!("OPENAI_API_KEY is not set; transcription sessions cannot start");
    }

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        // Browser clients connect cross-origin during development
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            // Session bridge: one actor per accepted connection
            .route("/v1/transcriptions", web::get().to(websocket::transcribe_ws))
            // Operational surface
            .route("/", web::get().to(health::health_check))
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(health::get_config))
            // Microphone capture page
            .service(actix_files::Files::new("/static", "./static").index_file("index.html"))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for either the server to finish or a shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// `RUST_LOG` controls what gets logged; without it the gateway defaults to
/// debug for its own crate and info for the web framework.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcribe_gateway=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set up SIGTERM/SIGINT handlers for graceful shutdown.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
