//! TTD-DR research engine.
//!
//! Implements the test-time diffusion deep-research loop: an initial noisy
//! draft is progressively denoised by repeated cycles of query formulation,
//! grounded retrieval, synthesis and draft revision, after which a structured
//! multi-chapter report is generated section by section, quality-validated,
//! and assembled into a single cited markdown document.
//!
//! # Architecture
//!
//! - [`client`]: unified Gemini client (completion, grounded generation,
//!   search, reranking) with retry/backoff and a fail-fast error taxonomy
//! - [`chunker`]: sentence-aligned document chunking with token-bounded overlap
//! - [`retriever`]: grounded-generation retrieval plus the legacy
//!   search/chunk/rerank route
//! - [`evolve`]: variant/critique/merge self-evolution for single-shot outputs
//! - [`pipeline`]: the research loop state machine
//! - [`report`]: structure generation, context management, section
//!   generation, quality validation and assembly
//! - [`events`]: typed progress events and the wire update shape
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ttdr_research::client::{GeminiClient, GeminiConfig};
//! use ttdr_research::events::LogSink;
//! use ttdr_research::pipeline::{PipelineConfig, ResearchPipeline};
//!
//! let client = Arc::new(GeminiClient::new(GeminiConfig {
//!     api_key: std::env::var("GEMINI_API_KEY")?,
//!     ..GeminiConfig::default()
//! })?);
//!
//! let mut pipeline =
//!     ResearchPipeline::new(client, PipelineConfig::default(), Box::new(LogSink));
//! pipeline.run("What are the latest developments in AI for 2024?").await?;
//! ```

pub mod chunker;
pub mod client;
pub mod error;
pub mod events;
pub mod evolve;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod retriever;

// Re-exports
pub use client::{Citation, GeminiClient, GeminiConfig};
pub use error::{ResearchError, ResearchResult};
pub use events::{LogSink, PipelineEvent, ProgressUpdate, UpdateSink};
pub use pipeline::{PipelineConfig, ResearchPipeline};
pub use report::validator::QualityThresholds;
