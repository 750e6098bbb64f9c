//! TTDR API - HTTP front-door for the deep-research pipeline.
//!
//! Exposes the research engine over three endpoints:
//!
//! - `GET /health`: liveness probe
//! - `POST /evaluate`: run the pipeline to completion, return the report
//! - `POST /run`: stream progress events over SSE until the terminal event
//!
//! # Architecture
//!
//! - [`config`]: layered configuration loading and validation
//! - [`api`]: HTTP endpoints
//! - [`conductor`]: static and streaming entry points over the pipeline
//! - [`server`]: router assembly and middleware
//! - [`logging`]: operation timers and startup logging macros

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod conductor;
pub mod config;
pub mod logging;
pub mod server;

use std::sync::Arc;

use ttdr_research::GeminiClient;

use config::AppConfig;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Shared provider client; immutable after construction and safe for
    /// concurrent pipelines.
    pub client: Arc<GeminiClient>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("client", &"GeminiClient")
            .finish()
    }
}
