//! Server-Sent Events feed of queue notifications.
//!
//! Replays recent events for late joiners, then streams live ones from the
//! [`cq_core::EventBus`] with periodic heartbeats.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::broadcast::error::RecvError;

use crate::context::AppContext;

/// Events replayed on connect.
const REPLAY: usize = 50;

/// GET /api/events/stream
pub async fn events_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let recent = ctx.event_bus.recent_events(REPLAY);
    let mut rx = ctx.event_bus.subscribe();

    let stream = async_stream::stream! {
        for event in recent.into_iter().rev() {
            if let Ok(data) = serde_json::to_string(&event) {
                yield Ok(Event::default().event(event.payload.kind()).data(data));
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if let Ok(data) = serde_json::to_string(&event) {
                                yield Ok(Event::default().event(event.payload.kind()).data(data));
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().event("heartbeat").data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
