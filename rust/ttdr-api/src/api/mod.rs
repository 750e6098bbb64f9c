//! HTTP API endpoints.

pub mod evaluate;
pub mod health;
pub mod run;

use axum::Router;

use crate::AppState;

/// Create the combined API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(evaluate::router())
        .merge(run::router())
}
