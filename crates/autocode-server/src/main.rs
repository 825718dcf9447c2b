//! Autocode Sync Server
//!
//! Hosts the workspace sync channel: clients join a workspace over a
//! WebSocket and every file event one of them publishes is fanned out to the
//! others. Nothing is persisted; storage stays with the participants.

mod handlers;

use anyhow::{Context, Result};
use autocode_core::sync::WorkspaceHub;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<WorkspaceHub>,
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    if let Err(e) = init_tracing() {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting Autocode Sync Server v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_server().await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("AUTOCODE_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let builder = FmtSubscriber::builder().with_env_filter(filter);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run_server() -> Result<()> {
    let config = load_config();
    info!("Config loaded: bind={}", config.bind_address);

    let state = AppState {
        hub: Arc::new(WorkspaceHub::new()),
    };
    let app = router(state);

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .context("Failed to parse bind address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(handlers::ws::handler))
        .nest("/api/v1", api_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route(
        "/workspaces/:id/members",
        get(handlers::workspaces::members),
    )
}

#[derive(Debug, Clone)]
struct Config {
    bind_address: String,
}

fn load_config() -> Config {
    let bind_address =
        std::env::var("AUTOCODE_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:16790".to_string());
    Config { bind_address }
}
