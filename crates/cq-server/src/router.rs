//! Axum router construction.

use std::path::Path;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::routes;

/// Build the complete Axum router. Finished outputs under `converted_dir`
/// are served at `/converted`.
pub fn build_router(ctx: AppContext, converted_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/conversions", post(routes::conversions::submit_conversion))
        .route("/queue", get(routes::status::queue_status))
        .route("/events", get(routes::status::recent_events))
        .route("/events/stream", get(routes::events::events_stream))
        .route("/formats", get(routes::status::list_formats));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .nest_service("/converted", ServeDir::new(converted_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
