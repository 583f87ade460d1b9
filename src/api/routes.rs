use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::db::SampleStore;
use crate::error::{AppError, TracedError};
use crate::generation::{create_ideas, IdeaModelClient, IdeaRequest, IdeaResponse};
use crate::types::{AnalysisParams, TraceId, VelocityReport};
use crate::velocity::VelocityAnalyzer;

#[derive(Clone)]
pub struct ApiState {
    pub store: SampleStore,
    pub health: Arc<HealthState>,
    pub model_client: Arc<dyn IdeaModelClient>,
    /// Used for query parameters the caller leaves out.
    pub defaults: AnalysisParams,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/velocity/top", get(get_velocity_top))
        .route("/ideas", post(post_ideas))
        .route("/ideas/health", get(get_ideas_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct VelocityTopQuery {
    pub window_hours: Option<u32>,
    pub top_n: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub last_analysis_ok: Option<bool>,
    pub last_result_count: u64,
    pub analyses_failed: u64,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealthResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        last_analysis_at: state.health.last_analysis_at(),
        last_analysis_ok: state.health.last_analysis_ok(),
        last_result_count: state.health.last_result_count(),
        analyses_failed: state.health.analyses_failed(),
    })
}

async fn get_velocity_top(
    State(state): State<ApiState>,
    Query(params): Query<VelocityTopQuery>,
) -> Result<Json<VelocityReport>, AppError> {
    let params = AnalysisParams::new(
        params.window_hours.unwrap_or(state.defaults.window_hours),
        params.top_n.unwrap_or(state.defaults.top_n),
    )?;

    let report = VelocityAnalyzer::new(state.store.clone()).analyze(params).await?;
    Ok(Json(report))
}

async fn post_ideas(
    State(state): State<ApiState>,
    Json(request): Json<IdeaRequest>,
) -> Result<Json<IdeaResponse>, TracedError> {
    let trace_id = TraceId::unique("api_ideas");

    create_ideas(&request, &trace_id, state.model_client.as_ref())
        .await
        .map(Json)
        .map_err(|error| TracedError {
            trace_id: trace_id.to_string(),
            error,
        })
}

async fn get_ideas_health() -> Json<ServiceHealthResponse> {
    Json(ServiceHealthResponse {
        service: "ideas",
        status: "healthy",
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::StubModelClient;
    use crate::types::{Snapshot, VideoMeta};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    async fn state() -> ApiState {
        ApiState {
            store: SampleStore::in_memory().await.unwrap(),
            health: Arc::new(HealthState::new()),
            model_client: Arc::new(StubModelClient::new()),
            defaults: AnalysisParams::default(),
        }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_analyzer_state() {
        let st = state().await;
        let Json(before) = get_health(State(st.clone())).await;
        assert!(before.ok);
        assert_eq!(before.last_analysis_ok, None);

        st.health.record_success(Utc::now().timestamp(), 4);
        let Json(after) = get_health(State(st)).await;
        assert_eq!(after.last_analysis_ok, Some(true));
        assert_eq!(after.last_result_count, 4);
    }

    #[tokio::test]
    async fn velocity_top_ranks_recent_samples() {
        let st = state().await;
        st.store
            .upsert_videos(&[VideoMeta {
                video_id: "v1".to_string(),
                title: Some("Launch".to_string()),
                ..Default::default()
            }])
            .await
            .unwrap();
        let now = Utc::now();
        let snaps: Vec<Snapshot> = [(10, 1000), (5, 1600)]
            .into_iter()
            .map(|(mins_ago, views)| Snapshot {
                entity_id: "v1".to_string(),
                captured_at: now - chrono::Duration::minutes(mins_ago),
                view_count: views,
                like_count: 0,
                comment_count: 0,
            })
            .collect();
        st.store.insert_snapshots(&snaps).await.unwrap();

        let query = VelocityTopQuery {
            window_hours: Some(1),
            top_n: None,
        };
        let Json(report) = get_velocity_top(State(st), Query(query)).await.unwrap();
        assert_eq!(report.analysis_params.top_n, 10);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].views_per_min, 120.0);
    }

    #[tokio::test]
    async fn zero_top_n_is_bad_request() {
        let query = VelocityTopQuery {
            window_hours: None,
            top_n: Some(0),
        };
        let err = get_velocity_top(State(state().await), Query(query)).await.unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn ideas_with_stub_client() {
        let req = IdeaRequest {
            keywords: vec!["갤럭시".to_string()],
            ..Default::default()
        };
        let Json(resp) = post_ideas(State(state().await), Json(req)).await.ok().unwrap();
        assert!(resp.check().is_ok());
        assert_eq!(resp.metadata.model, "stub-client");
    }

    #[tokio::test]
    async fn invalid_ideas_request_is_unprocessable_with_trace_id() {
        let req = IdeaRequest {
            keywords: (0..11).map(|i| format!("k{i}")).collect(),
            ..Default::default()
        };
        let err = post_ideas(State(state().await), Json(req)).await.err().unwrap();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["trace_id"].as_str().unwrap().starts_with("api_ideas_"));
    }

    #[tokio::test]
    async fn ideas_health_is_static() {
        let Json(h) = get_ideas_health().await;
        assert_eq!((h.service, h.status), ("ideas", "healthy"));
    }
}
