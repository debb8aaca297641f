//! Read-only queue, event and catalog views.

use axum::extract::{Query, State};
use axum::Json;
use cq_core::Event;
use cq_queue::catalog::{self, FormatConfig, QualityPreset};
use cq_queue::QueueSnapshot;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub formats: &'static [FormatConfig],
    pub qualities: &'static [QualityPreset],
}

/// GET /api/queue
pub async fn queue_status(State(ctx): State<AppContext>) -> Result<Json<QueueSnapshot>, AppError> {
    Ok(Json(ctx.queue.snapshot().await?))
}

/// GET /api/events?limit=n -- newest first.
pub async fn recent_events(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    Json(ctx.event_bus.recent_events(params.limit))
}

/// GET /api/formats
pub async fn list_formats() -> Json<CatalogResponse> {
    Json(CatalogResponse {
        formats: catalog::formats(),
        qualities: catalog::qualities(),
    })
}
