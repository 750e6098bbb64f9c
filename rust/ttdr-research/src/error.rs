//! Error taxonomy for the research engine.
//!
//! Provider errors are classified from their message text into three kinds:
//! rate-limit (429 / RESOURCE_EXHAUSTED), transient (timeout / 502 / 503) and
//! fatal (everything else). Only the first two are retried; a fatal error or
//! an exhausted retry budget surfaces as [`ResearchError::Provider`].

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Core error type for the research engine.
#[derive(Error, Debug)]
pub enum ResearchError {
    /// Provider call failed after all retry attempts (or fatally, without retry).
    #[error(
        "Gemini API {operation} failed: {message}\n\
         Attempts: {attempts}/{max_attempts}\n\
         Please check:\n\
         1. API key is valid\n\
         2. Rate limits not exceeded\n\
         3. Network connectivity\n\
         4. Gemini API status: https://status.cloud.google.com/"
    )]
    Provider {
        /// Human-readable operation name (e.g. "LLM completion").
        operation: &'static str,
        /// Attempts consumed before giving up.
        attempts: u32,
        /// Configured attempt budget.
        max_attempts: u32,
        /// The provider's final error message.
        message: String,
    },

    /// Configuration errors (missing API key, invalid settings).
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for research engine operations.
pub type ResearchResult<T> = Result<T, ResearchError>;

/// Classification of a provider error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 429 / RESOURCE_EXHAUSTED. Retried after the provider's retry-after hint.
    RateLimit,
    /// Timeouts, 502, 503. Retried on the exponential schedule.
    Transient,
    /// Everything else (invalid key, 400, content policy). Never retried.
    Fatal,
}

/// Classify a provider error message by keyword.
#[must_use]
pub fn classify_error(message: &str) -> ErrorKind {
    if message.contains("429") || message.contains("RESOURCE_EXHAUSTED") {
        ErrorKind::RateLimit
    } else if message.contains("timeout") || message.contains("502") || message.contains("503") {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    }
}

static RETRY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in (\d+(?:\.\d+)?)\s*s").expect("retry-after pattern is valid")
});

/// Extract the retry-after duration in seconds from a rate-limit error message.
///
/// Matches the provider's `... Please retry in 44.025501755s.` phrasing and
/// returns `None` when no hint is present.
#[must_use]
pub fn parse_retry_after(message: &str) -> Option<f64> {
    RETRY_AFTER_RE
        .captures(message)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Render a retry-after hint the way the provider phrases it.
#[must_use]
pub fn format_retry_after(seconds: f64) -> String {
    format!("Please retry in {seconds}s.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(classify_error("429 RESOURCE_EXHAUSTED"), ErrorKind::RateLimit);
        assert_eq!(
            classify_error("Quota exceeded: RESOURCE_EXHAUSTED"),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(classify_error("503 Service Unavailable"), ErrorKind::Transient);
        assert_eq!(classify_error("502 Bad Gateway"), ErrorKind::Transient);
        assert_eq!(classify_error("request timeout"), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_fatal() {
        assert_eq!(classify_error("400 Bad Request"), ErrorKind::Fatal);
        assert_eq!(classify_error("API key not valid"), ErrorKind::Fatal);
    }

    #[test]
    fn test_parse_retry_after_real_message() {
        let msg = "You exceeded your current quota, please check your plan and billing details. \
                   Quota exceeded for metric: generate_content_free_tier_requests, limit: 250\n\
                   Please retry in 44.025501755s.";
        assert_eq!(parse_retry_after(msg), Some(44.025_501_755));
    }

    #[test]
    fn test_parse_retry_after_variants() {
        assert_eq!(parse_retry_after("Please retry in 60s."), Some(60.0));
        assert_eq!(
            parse_retry_after("Rate limit exceeded. Please retry in 30s"),
            Some(30.0)
        );
        assert_eq!(parse_retry_after("Internal server error"), None);
    }

    #[test]
    fn test_retry_after_round_trip() {
        for t in [0.01, 0.5, 2.5, 44.025_501_755, 60.0, 3600.0] {
            assert_eq!(parse_retry_after(&format_retry_after(t)), Some(t));
        }
    }

    #[test]
    fn test_provider_error_display() {
        let err = ResearchError::Provider {
            operation: "LLM completion",
            attempts: 3,
            max_attempts: 3,
            message: "503 Service Unavailable".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("Gemini API LLM completion failed"));
        assert!(text.contains("Attempts: 3/3"));
        assert!(text.contains("API key is valid"));
    }
}
