//! Streaming research endpoint.
//!
//! Starts the pipeline on a worker task and streams progress updates as
//! Server-Sent Events. The stream terminates after the event carrying
//! `complete: true`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::post, Json, Router};
use serde::Deserialize;

use crate::conductor;
use crate::AppState;

/// Create the run router.
pub fn router() -> Router<AppState> {
    Router::new().route("/run", post(run))
}

/// Streaming run request.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// The research question.
    pub question: Option<String>,
}

/// Stream pipeline progress over SSE.
async fn run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = request
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Missing field: question".to_string(),
        ))?
        .to_string();

    Ok(conductor::run_streaming(&state, question))
}
