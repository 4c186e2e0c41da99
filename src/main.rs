mod collab;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod ws;

use std::panic;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use collab::{CollabConfig, RoomRegistry};
use config::Config;
use docs::ApiDoc;
use routes::create_api_routes;

/// Shared state handed to every handler.
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
}

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
            "cowrite_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::init_config(config.clone());

    // The handshake path resolves usernames through this cache
    ws::userctx::init_user_ctx_cache();

    // Initialize database connection if URL is provided
    if let Some(db_url) = &config.db_url {
        match db::dbdocs::init_db(db_url).await {
            Ok(_) => info!("Database initialized successfully"),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Document loading and saving will not be available");
            }
        }
    } else {
        warn!("No database URL configured - document loading and saving will not be available");
    }

    // Wire the collaboration core to the document store
    let collab_config = CollabConfig {
        on_load_document: Arc::new(ws::wsdocs::on_load_document),
        on_save_document: Arc::new(ws::wsdocs::on_save_document),
        save_delay: config.save_delay(),
    };
    let registry = RoomRegistry::new(collab_config);
    let app_state = Arc::new(AppState { registry });

    // Create API routes
    let api_routes = create_api_routes(app_state.clone());

    // Combine all routes
    let app_routes = Router::new()
        // Mount the collaboration WebSocket endpoint
        .route("/ws", get(ws::handler::websocket_handler))
        .with_state(app_state)
        // Mount API routes
        .nest("/api", api_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    // Start the HTTP server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}

fn cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
