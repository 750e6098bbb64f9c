//! Static evaluation endpoint.
//!
//! Runs the research pipeline to completion and returns the final report in a
//! single JSON response. Missing or empty request fields are a 400; pipeline
//! failures are a 500.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::conductor;
use crate::AppState;

/// Create the evaluate router.
pub fn router() -> Router<AppState> {
    Router::new().route("/evaluate", post(evaluate))
}

/// Static evaluation request.
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    /// The research question.
    pub query: Option<String>,
    /// Opaque correlation id, echoed back as `query_id`.
    pub iid: Option<String>,
}

/// Static evaluation response.
#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    /// The request's correlation id.
    pub query_id: String,
    /// The final report text.
    pub generated_response: String,
}

/// Run the pipeline synchronously and return the final report.
async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, (StatusCode, String)> {
    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Missing field: query".to_string()))?
        .to_string();
    let iid = request
        .iid
        .as_deref()
        .map(str::trim)
        .filter(|iid| !iid.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Missing field: iid".to_string()))?
        .to_string();

    match conductor::run_static(&state, &query).await {
        Ok(report) => Ok(Json(EvaluateResponse {
            query_id: iid,
            generated_response: report,
        })),
        Err(e) => {
            error!("Static evaluation failed: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Static evaluation failed".to_string(),
            ))
        }
    }
}
