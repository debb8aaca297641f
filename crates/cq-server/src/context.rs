//! Shared state for route handlers.

use std::sync::Arc;

use cq_core::config::Config;
use cq_core::EventBus;
use cq_queue::QueueHandle;

/// Handed to every handler via Axum state. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub queue: QueueHandle,
    pub event_bus: Arc<EventBus>,
}
