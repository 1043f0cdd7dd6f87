//! Notice Board Backend - events, notices and push notifications
//!
//! Starts the HTTP API together with two background tasks:
//! - the notification dispatcher following the document store's change feed
//! - the periodic sweep completing events past their grace window

use axum::Router;
use noticeboard_backend::clock::{Clock, SystemClock};
use noticeboard_backend::dispatcher::NotificationDispatcher;
use noticeboard_backend::reconcile::Reconciler;
use noticeboard_backend::repository::{DataSourceManager, EventRepository};
use noticeboard_backend::{build_router, push, AppState, Config};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Initialize structured logging
    init_tracing();

    // Load configuration
    let config = Config::from_env();
    log_startup_info(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server stopped");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize core components
    let sources = Arc::new(DataSourceManager::open(&config).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Start background workers
    let sender = push::create_sender(&config).await;
    Arc::new(NotificationDispatcher::new(
        sources.document_store().clone(),
        sender,
    ))
    .start();

    Arc::new(Reconciler::new(
        EventRepository::new(sources.clone()),
        clock.clone(),
        config.reconcile_interval,
    ))
    .start();

    // Build and serve the application
    let app = build_router(AppState::new(sources, clock));
    serve(app, &config).await
}

/// Initialize tracing with environment-based log levels.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("noticeboard_backend=debug,tower_http=info")),
        )
        .init();
}

/// Log startup configuration (no secrets).
fn log_startup_info(config: &Config) {
    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        storage_mode = ?config.storage_mode,
        data_dir = %config.data_dir.display(),
        corrupt_data_policy = ?config.corrupt_data_policy,
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        apns_enabled = config.apns.is_some(),
        "Starting notice board backend"
    );
}

/// Bind to address and serve the application.
async fn serve(app: Router, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = format!("{}:{}", config.bind_addr, config.port);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!(addr = %bind_addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
