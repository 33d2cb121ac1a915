pub mod actor;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod store;

pub use actor::{Actor, ActorResolver, PassphraseTable};
pub use config::{CliArgs, ServerConfig, StoreKind};
pub use envelope::Envelope;
pub use error::{ErrorCode, EventsError};
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use shutdown::{ShutdownConfig, ShutdownCoordinator};
pub use state::AppState;

use anyhow::Result;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use handlers::{
    CREATE_PATH, DELETE_PATH, FETCH_PATH, LIST_ALL_PATH, LIST_VISIBLE_PATH, UPDATE_PATH,
    VISIBLE_PATH,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the HTTP router: event routes behind the request pipeline, plus
/// health and metrics endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let events = Router::new()
        .route("/", get(handlers::root_info))
        .route(LIST_VISIBLE_PATH, post(handlers::list_visible))
        .route(LIST_ALL_PATH, post(handlers::list_all))
        .route(DELETE_PATH, post(handlers::delete_event))
        .route(VISIBLE_PATH, post(handlers::set_visibility))
        .route(CREATE_PATH, post(handlers::create_event))
        .route(UPDATE_PATH, post(handlers::update_event))
        .route(FETCH_PATH, post(handlers::fetch_event))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            pipeline::attach_actor,
        ));

    let operations = Router::new()
        .route("/health", get(health::liveness_handler))
        .route("/ready", get(health::readiness_handler))
        .route("/health/components", get(health::components_handler))
        .route("/metrics", get(handlers::metrics_handler));

    events
        .merge(operations)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(AppState::from_config(config.clone())?);

    tracing::info!(
        store = %config.store,
        database = %config.database,
        collection = %config.collection,
        actors = state.resolver().registered(),
        "starting events API",
    );

    let router = build_router(state);
    let listener = TcpListener::bind(config.http_bind_address).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(bind = %actual_addr, "listening");

    let shutdown_config =
        ShutdownConfig::default().with_drain_timeout(config.graceful_shutdown_timeout_secs);
    let coordinator = Arc::new(ShutdownCoordinator::new(shutdown_config));
    coordinator.serve(listener, router).await?;

    tracing::info!("server stopped");
    Ok(())
}
