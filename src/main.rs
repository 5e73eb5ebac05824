use scribesync::store::InMemoryDocumentStore;
use scribesync::{create_app, spawn_presence_sweeper, AppState, Config};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "scribesync=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.jwt_secret.is_none() {
        warn!("No JWT secret configured - WebSocket connections will be refused");
    }

    // The persistence collaborator is external; without one configured the
    // service runs against an in-memory document store.
    let store = Arc::new(InMemoryDocumentStore::new());
    warn!("No external document store wired - using in-memory store");

    let state = AppState::new(config.clone(), store);
    spawn_presence_sweeper(state.clone());

    let app = create_app(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("Server running on http://{}", config.server_address());
    info!(
        "WebSocket available at ws://{}/api/v1/ws",
        config.server_address()
    );
    info!(
        "Swagger UI available at http://{}/swagger",
        config.server_address()
    );

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
