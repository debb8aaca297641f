//! cq-server: HTTP front end and service wiring for the conversion queue.
//!
//! - Axum API for submitting conversions and observing the queue
//! - Listener notifications over HTTP ([`HttpNotifier`])
//! - Static serving of finished outputs
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod host;
pub mod notifications;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use cq_av::{FfmpegEngine, FfprobeExtractor, ToolRegistry};
use cq_core::config::Config;
use cq_core::{EventBus, FanOut, NotificationSink};
use cq_queue::{QueueContext, QueueHandle, QueueManager};
use tokio_util::sync::CancellationToken;

pub use context::AppContext;
pub use notifications::HttpNotifier;

/// Build the production queue: ffmpeg/ffprobe from `tools`, notifications to
/// `event_bus` plus the configured listener.
pub fn spawn_queue(
    config: &Config,
    tools: &ToolRegistry,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
) -> QueueHandle {
    let engine = Arc::new(FfmpegEngine::new(
        tools.path_or_name("ffmpeg"),
        config.encoding.hw_accel.clone(),
    ));
    let extractor = Arc::new(FfprobeExtractor::new(tools.path_or_name("ffprobe")));

    let mut sink = FanOut::new().with(event_bus);
    if let Some(url) = config.notifications.listener_url.as_deref() {
        tracing::info!(listener = %url, "Forwarding notifications to listener");
        sink = sink.with(Arc::new(HttpNotifier::new(url, config.notifications.timeout())));
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);

    let ctx = QueueContext::new(
        config.queue.clone(),
        engine,
        extractor,
        sink,
        host::public_base_url(&config.server),
    );
    QueueManager::spawn(ctx, cancel)
}

/// Log which external tools were found.
pub fn log_tools(tools: &ToolRegistry) {
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }
}

/// Start the conversion service.
///
/// Runs the HTTP server and the queue until a shutdown signal is received.
pub async fn start(config: Config) -> cq_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let converted_dir = config.queue.converted_dir();
    for dir in [config.queue.input_dir(), converted_dir.clone()] {
        tokio::fs::create_dir_all(&dir).await?;
    }

    let tools = ToolRegistry::discover(&config.tools);
    log_tools(&tools);

    let cancel = CancellationToken::new();
    let event_bus = Arc::new(EventBus::default());
    let queue = spawn_queue(&config, &tools, event_bus.clone(), cancel.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| cq_core::Error::Config(format!("Invalid server address: {e}")))?;

    let ctx = AppContext {
        config: Arc::new(config),
        queue,
        event_bus,
    };
    let app = router::build_router(ctx, &converted_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| cq_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
