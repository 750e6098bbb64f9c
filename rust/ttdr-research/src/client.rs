//! Gemini API client for LLM, search, and reranking operations.
//!
//! Single gateway to the remote model. All operations share the same retry
//! policy: rate-limit errors wait for the provider's retry-after hint plus a
//! buffer, transient errors follow the exponential schedule, fatal errors
//! fail fast. Exhaustion surfaces a structured [`ResearchError::Provider`]
//! that callers are expected to propagate, not swallow.
//!
//! Grounding metadata lives at `candidates[0].groundingMetadata`; each web
//! chunk's URL field is `uri` (not `url`), the title is available, and no
//! snippet field exists.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunker::{Chunk, truncate_chars};
use crate::error::{ErrorKind, ResearchError, ResearchResult, classify_error, parse_retry_after};

const SCORING_SYSTEM_PROMPT: &str =
    "You are a relevance scoring system. Provide only numeric scores.";

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// A web citation extracted from grounding metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source URL (the grounding chunk's `uri` field).
    pub url: String,
    /// Source page title.
    pub title: String,
}

/// A search result mapped from grounding metadata.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Source URL.
    pub url: String,
    /// Result text. Only the title is available; no snippet exists.
    pub text: String,
    /// Source page title.
    pub title: Option<String>,
}

/// A chunk with its relevance score after reranking.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    /// Chunk identifier carried over from the chunker.
    pub chunk_id: usize,
    /// Chunk text.
    pub text: String,
    /// Normalized relevance score in `[0, 1]`.
    pub score: f64,
    /// Source URL.
    pub url: Option<String>,
    /// Estimated token count.
    pub token_count: usize,
}

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key. Required.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum attempts per operation.
    pub max_retries: u32,
    /// Exponential backoff delays for transient errors, in seconds.
    pub retry_delays: Vec<f64>,
    /// Buffer added to the provider's retry-after hint, in seconds.
    pub rate_limit_buffer_secs: f64,
    /// Fallback wait when a rate-limit error carries no retry-after hint.
    pub rate_limit_default_secs: f64,
    /// Optional `HTTP-Referer` pass-through header.
    pub referrer: Option<String>,
    /// Optional `X-Title` pass-through header.
    pub title: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            retry_delays: vec![1.0, 2.0, 4.0],
            rate_limit_buffer_secs: 5.0,
            rate_limit_default_secs: 60.0,
            referrer: None,
            title: None,
        }
    }
}

/// Unified Gemini API client for LLM, search, and reranking operations.
///
/// Immutable after construction and safe to share across concurrent
/// pipelines; it holds no mutable state beyond the pooled HTTP client.
#[derive(Debug)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    /// Create a new client.
    ///
    /// Fails when the API key is empty.
    pub fn new(config: GeminiConfig) -> ResearchResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ResearchError::Config(
                "GEMINI_API_KEY not found. Please set the environment variable:\n\
                 export GEMINI_API_KEY=your_api_key_here"
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResearchError::Config(format!("Failed to build HTTP client: {e}")))?;

        info!("Initialized GeminiClient with model: {}", config.model);

        Ok(Self { config, client })
    }

    /// The configured model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate a text completion with default sampling (temperature 0.7).
    pub async fn complete(&self, prompt: &str, system_prompt: &str) -> ResearchResult<String> {
        self.complete_with(prompt, system_prompt, 0.7, DEFAULT_MAX_OUTPUT_TOKENS)
            .await
    }

    /// Generate a text completion with explicit sampling parameters.
    pub async fn complete_with(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> ResearchResult<String> {
        let body = GenerateContentRequest::new(system_prompt, prompt, temperature, max_tokens);
        let response = self.generate(&body, "LLM completion").await?;
        let content = response.text();
        debug!("Gemini response (200 chars): {}", truncate_chars(&content, 200));
        Ok(content)
    }

    /// Generate a completion with Google Search grounding.
    ///
    /// The provider searches the web, feeds results into the model, and
    /// returns a response plus source citations in a single call. A response
    /// without grounding chunks yields text with an empty citation list.
    pub async fn complete_with_search(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> ResearchResult<(String, Vec<Citation>)> {
        let body = GenerateContentRequest::new(system_prompt, prompt, 0.7, DEFAULT_MAX_OUTPUT_TOKENS)
            .with_search();
        let response = self.generate(&body, "Grounded generation").await?;

        let content = response.text();
        let citations = response.citations();

        info!(
            "Grounded generation complete: {} chars, {} citations",
            content.chars().count(),
            citations.len()
        );
        debug!(
            "Response preview (200 chars): {}",
            truncate_chars(&content, 200)
        );

        Ok((content, citations))
    }

    /// Search the web via the grounding API, returning raw source rows.
    ///
    /// Returns an empty list (never an error) when the provider surfaces no
    /// grounding chunks for the query.
    pub async fn search(&self, query: &str, top_k: usize) -> ResearchResult<Vec<SearchResult>> {
        let body = GenerateContentRequest::new("", query, 0.7, 2048).with_search();
        let response = self.generate(&body, "Search").await?;

        let mut results: Vec<SearchResult> = response
            .citations()
            .into_iter()
            .map(|c| SearchResult {
                url: c.url,
                text: c.title.clone(),
                title: Some(c.title),
            })
            .collect();
        results.truncate(top_k);

        debug!("Gemini Search returned {} results for query: {query}", results.len());
        if results.is_empty() {
            warn!("Gemini Search returned no results for query: {query}");
        }

        Ok(results)
    }

    /// Rerank chunks by semantic relevance to the query.
    ///
    /// Each chunk is scored 0-10 by a deterministic completion (temperature 0)
    /// and normalized to `[0, 1]`; chunks whose score cannot be parsed get 0.
    /// Returns the top `top_k` chunks sorted by descending score.
    pub async fn rerank_chunks(
        &self,
        query: &str,
        chunks: &[Chunk],
        top_k: usize,
    ) -> ResearchResult<Vec<RankedChunk>> {
        let mut scored: Vec<RankedChunk> = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let score = self.score_chunk(query, chunk).await;
            scored.push(RankedChunk {
                chunk_id: chunk.chunk_id,
                text: chunk.text.clone(),
                score,
                url: chunk.url.clone(),
                token_count: chunk.token_count,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Score a single chunk for relevance to the query on a 0-1 scale.
    async fn score_chunk(&self, query: &str, chunk: &Chunk) -> f64 {
        let scoring_prompt = format!(
            "\nRate the relevance of the following text chunk to the query on a scale of 0-10.\n\n\
             Query: {query}\n\n\
             Text Chunk:\n{chunk_text}\n\n\
             Provide ONLY a numeric score (0-10) where:\n\
             - 0 = Completely irrelevant\n\
             - 5 = Somewhat relevant\n\
             - 10 = Highly relevant and directly answers the query\n\n\
             Score:",
            chunk_text = truncate_chars(&chunk.text, 1000),
        );

        match self
            .complete_with(&scoring_prompt, SCORING_SYSTEM_PROMPT, 0.0, 10)
            .await
        {
            Ok(response) => match parse_score(&response) {
                Some(score) => (score / 10.0).clamp(0.0, 1.0),
                None => {
                    warn!("Could not parse score from response: {}", response.trim());
                    0.0
                }
            },
            Err(e) => {
                warn!("Failed to score chunk {}: {e}", chunk.chunk_id);
                0.0
            }
        }
    }

    /// Execute a generation request with retry and backoff.
    async fn generate(
        &self,
        body: &GenerateContentRequest,
        operation: &'static str,
    ) -> ResearchResult<GenerateContentResponse> {
        let max_retries = self.config.max_retries;
        let mut last_error = String::new();

        for attempt in 1..=max_retries {
            match self.send_once(body).await {
                Ok(response) => return Ok(response),
                Err(message) => {
                    let kind = classify_error(&message);
                    last_error = message;

                    if kind == ErrorKind::Fatal || attempt == max_retries {
                        warn!("{operation} failed after {attempt} attempts: {last_error}");
                        return Err(ResearchError::Provider {
                            operation,
                            attempts: attempt,
                            max_attempts: max_retries,
                            message: last_error,
                        });
                    }

                    let delay = match kind {
                        ErrorKind::RateLimit => {
                            let retry_after = parse_retry_after(&last_error)
                                .unwrap_or(self.config.rate_limit_default_secs);
                            let buffer = self.config.rate_limit_buffer_secs;
                            let delay = retry_after + buffer;
                            warn!(
                                "API requests retry after {retry_after}s + {buffer}s buffer = {delay}s"
                            );
                            delay
                        }
                        ErrorKind::Transient => self
                            .config
                            .retry_delays
                            .get(attempt as usize - 1)
                            .or(self.config.retry_delays.last())
                            .copied()
                            .unwrap_or(1.0),
                        ErrorKind::Fatal => unreachable!("fatal errors return above"),
                    };

                    warn!(
                        "{operation} failed (attempt {attempt}/{max_retries}): {last_error}. \
                         Retrying in {delay}s..."
                    );
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        }

        Err(ResearchError::Provider {
            operation,
            attempts: max_retries,
            max_attempts: max_retries,
            message: last_error,
        })
    }

    /// Issue a single generation request; errors are stringified for
    /// classification.
    async fn send_once(
        &self,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let mut request = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.config.api_key.as_str())
            .header("content-type", "application/json")
            .json(body);
        if let Some(referrer) = &self.config.referrer {
            request = request.header("HTTP-Referer", referrer.as_str());
        }
        if let Some(title) = &self.config.title {
            request = request.header("X-Title", title.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                format!("timeout after {}s: {e}", self.config.timeout_secs)
            } else {
                format!("request failed: {e}")
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {text}"));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {e}"))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "LLM usage: prompt={:?} completion={:?} total={:?}",
                usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
            );
        }

        Ok(parsed)
    }
}

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("score pattern is valid"));

/// Extract the first number from a relevance-scoring response.
fn parse_score(response: &str) -> Option<f64> {
    SCORE_RE
        .captures(response.trim())?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

// Request/response bodies for the `generateContent` endpoint (camelCase JSON).

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

impl GenerateContentRequest {
    /// Build a request with the system prompt prepended to the user message.
    fn new(system_prompt: &str, prompt: &str, temperature: f32, max_tokens: u32) -> Self {
        let full_prompt = if system_prompt.is_empty() {
            prompt.to_string()
        } else {
            format!("{system_prompt}\n\n{prompt}")
        };
        Self {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart { text: full_prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            },
            tools: None,
        }
    }

    /// Enable the Google Search tool for grounded generation.
    fn with_search(mut self) -> Self {
        self.tools = Some(vec![Tool {
            google_search: GoogleSearch {},
        }]);
        self
    }
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    /// Concatenate the top candidate's text parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    /// Extract web citations from the top candidate's grounding metadata.
    fn citations(&self) -> Vec<Citation> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|metadata| {
                metadata
                    .grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .map(|web| Citation {
                        url: web.uri.clone(),
                        title: web.title.clone().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_fails_construction() {
        let err = GeminiClient::new(GeminiConfig::default()).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY not found"));
    }

    #[test]
    fn test_parse_score_variants() {
        assert_eq!(parse_score("7"), Some(7.0));
        assert_eq!(parse_score("  8.5\n"), Some(8.5));
        assert_eq!(parse_score("Score: 9"), Some(9.0));
        assert_eq!(parse_score("not a number"), None);
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello, "}, {"text": "world."}]}
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.text(), "Hello, world.");
    }

    #[test]
    fn test_citations_use_uri_field() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "grounded answer"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://example.com/a", "title": "A"}},
                        {"web": {"uri": "https://example.com/b", "title": "B"}},
                        {"retrievedContext": {}}
                    ]
                }
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let citations = response.citations();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].url, "https://example.com/a");
        assert_eq!(citations[0].title, "A");
    }

    #[test]
    fn test_zero_grounding_chunks_yield_empty_citations() {
        let raw = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "answer"}]}}]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.text(), "answer");
        assert!(response.citations().is_empty());
    }

    #[test]
    fn test_search_request_includes_tool() {
        let request = GenerateContentRequest::new("sys", "query", 0.7, 2048).with_search();
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["tools"][0]["googleSearch"].is_object());
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(value["contents"][0]["parts"][0]["text"], "sys\n\nquery");
    }
}
