//! Listener notifications over HTTP.
//!
//! Every lifecycle event is POSTed as JSON to the configured listener. All
//! notifications are fire-and-forget: errors are logged but never propagate
//! to the queue.

use std::sync::OnceLock;
use std::time::Duration;

use cq_core::{ConversionEvent, NotificationSink};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

type Delivery = (&'static str, Value);

/// Posts [`ConversionEvent`]s to `<listener>/queue|start|progress|error|complete`.
///
/// Holds a shared [`reqwest::Client`] so connection pools are reused across
/// calls. Events handed to [`NotificationSink::notify`] are delivered one at
/// a time by a background task, in the order they were emitted; a slow
/// listener delays later deliveries but never the queue.
#[derive(Debug)]
pub struct HttpNotifier {
    client: Client,
    base_url: String,
    outbox: OnceLock<mpsc::UnboundedSender<Delivery>>,
}

impl HttpNotifier {
    /// Create a notifier for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build notification HTTP client: {e}");
            Client::new()
        });

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            outbox: OnceLock::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Deliver one event and wait for the outcome. Errors are logged.
    pub async fn send(&self, event: &ConversionEvent) {
        let (path, body) = listener_request(event);
        post(&self.client, format!("{}{path}", self.base_url), body).await;
    }

    /// Sender feeding the delivery task, started on first use.
    fn outbox(&self, runtime: &tokio::runtime::Handle) -> &mpsc::UnboundedSender<Delivery> {
        self.outbox.get_or_init(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
            let client = self.client.clone();
            let base_url = self.base_url.clone();
            runtime.spawn(async move {
                while let Some((path, body)) = rx.recv().await {
                    post(&client, format!("{base_url}{path}"), body).await;
                }
            });
            tx
        })
    }
}

impl NotificationSink for HttpNotifier {
    fn notify(&self, event: &ConversionEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = event.kind(), "No async runtime; listener notification dropped");
            return;
        };
        if self.outbox(&runtime).send(listener_request(event)).is_err() {
            tracing::warn!(event = event.kind(), "Listener delivery task stopped; notification dropped");
        }
    }
}

/// Endpoint path and JSON body the listener expects for `event`.
pub fn listener_request(event: &ConversionEvent) -> (&'static str, Value) {
    match event {
        ConversionEvent::Queued { output_file, task } => {
            ("/queue", json!({ "hash": output_file, "task": task }))
        }
        ConversionEvent::Started { hash } => ("/start", json!({ "hash": hash })),
        ConversionEvent::Progress {
            hash,
            current_kbps,
            target_size,
            timemark,
            percent,
        } => (
            "/progress",
            json!({
                "hash": hash,
                "info": {
                    "current_kbps": current_kbps,
                    "target_size": target_size,
                    "timemark": timemark,
                    "percent": percent,
                },
            }),
        ),
        ConversionEvent::Failed { hash, error } => ("/error", json!({ "hash": hash, "error": error })),
        ConversionEvent::Completed {
            hash,
            url,
            output_file,
            title,
            album,
            artist,
        } => (
            "/complete",
            json!({
                "hash": hash,
                "info": {
                    "url": url,
                    "output_file": output_file,
                    "title": title,
                    "album": album,
                    "artist": artist,
                },
            }),
        ),
    }
}

async fn post(client: &Client, url: String, body: Value) {
    match client.post(&url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(url = %url, "Listener notified");
        }
        Ok(resp) => {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(
                url = %url,
                status = %status,
                body = %text,
                "Listener returned non-success status"
            );
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to contact listener");
        }
    }
}
