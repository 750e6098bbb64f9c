//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use ttdr_research::GeminiClient;

use crate::api;
use crate::config::AppConfig;
use crate::logging::StageTimer;
use crate::{log_banner, log_stage, AppState};

/// TTDR API version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application with all routes and middleware.
pub fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let overall = StageTimer::start("create_app");

    log_banner!(
        format!("TTDR API v{VERSION}"),
        format!(
            "model {} | {} retrieval",
            config.provider.model,
            if config.research.grounded_retrieval {
                "grounded"
            } else {
                "legacy search/rerank"
            }
        )
    );

    let stage = StageTimer::start("provider_client");
    let client_result = GeminiClient::new(config.gemini_config());
    stage.done_with(&client_result);
    let client = Arc::new(client_result?);
    log_stage!(1, 3, "provider client", config.provider.model);

    let pipeline_config = config.pipeline_config();
    log_stage!(
        2,
        3,
        "research settings",
        format!(
            "{} iteration(s), structured reports {}",
            pipeline_config.max_iterations,
            if pipeline_config.structured_reports {
                "on"
            } else {
                "off"
            }
        )
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        client,
    };

    let stage = StageTimer::start("router");
    let app = api::create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    log_stage!(3, 3, "router", "routes and middleware configured");
    stage.done();

    overall.done();
    tracing::info!("TTDR API server created");

    Ok(app)
}
