use std::time::Instant;

use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::generation::client::IdeaModelClient;
use crate::generation::schema::{IdeaRequest, IdeaResponse};
use crate::types::TraceId;

/// Validate the request, generate with `client`, and re-check the output against
/// the guardrails. Content rule failures stay `Validation`; anything else the client
/// reports becomes `Dependency`.
pub async fn create_ideas(
    request: &IdeaRequest,
    trace_id: &TraceId,
    client: &dyn IdeaModelClient,
) -> Result<IdeaResponse> {
    request.validate()?;

    info!(
        trace_id = %trace_id,
        model = client.model_name(),
        keywords = ?request.keywords,
        video_id = ?request.video_id,
        "Ideas request received"
    );
    let started = Instant::now();

    let outcome = match client.generate_ideas(request, trace_id).await {
        Ok(response) => response.check().map(|_| response),
        Err(AppError::Validation(msg)) => Err(AppError::Validation(msg)),
        Err(e) => Err(AppError::Dependency(e.to_string())),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(response) => {
            info!(
                trace_id = %trace_id,
                latency_ms,
                titles_count = response.titles.len(),
                tags_count = response.tags.len(),
                retry_count = response.metadata.retry_count,
                "Ideas request completed"
            );
            Ok(response)
        }
        Err(e) => {
            error!(trace_id = %trace_id, latency_ms, code = e.code(), "Ideas request failed: {e}");
            Err(e)
        }
    }
}
