//! Conversion submission.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cq_core::ConversionTask;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

/// Response for an accepted conversion.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitConversionResponse {
    pub output_file: String,
    pub hash: String,
}

/// POST /api/conversions
///
/// Queues the task and answers immediately; the outcome is reported through
/// notifications.
pub async fn submit_conversion(
    State(ctx): State<AppContext>,
    Json(task): Json<ConversionTask>,
) -> Result<(StatusCode, Json<SubmitConversionResponse>), AppError> {
    task.validate()?;

    let hash = cq_queue::input_hash(&task.input_file);
    let output_file = ctx.queue.enqueue(task);
    tracing::debug!(hash = %hash, output_file = %output_file, "Conversion accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitConversionResponse { output_file, hash }),
    ))
}
