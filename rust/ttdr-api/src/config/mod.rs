//! Configuration management for the TTDR API.
//!
//! Configuration is loaded in layers: defaults, an optional `config/ttdr`
//! file, `TTDR__`-prefixed environment variables, then a handful of specific
//! environment overrides (`GEMINI_API_KEY`, `GEMINI_MODEL`, `HTTP_REFERER`,
//! `X_TITLE`). Validation runs after loading; a missing provider API key is a
//! startup failure, not a request-time one.

use serde::{Deserialize, Serialize};
use ttdr_research::report::validator::QualityThresholds;
use ttdr_research::{GeminiConfig, PipelineConfig};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Provider (Gemini) configuration.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Research pipeline configuration.
    #[serde(default)]
    pub research: ResearchSettings,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config files, then validate.
    ///
    /// Use [`Self::load_unchecked`] to skip validation.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // Load .env file if present.
        let _ = dotenvy::dotenv();

        let raw = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("provider.model", "gemini-flash-latest")?
            .add_source(config::File::with_name("config/ttdr").required(false))
            .add_source(
                config::Environment::with_prefix("TTDR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = raw.try_deserialize().unwrap_or_default();

        // Specific environment overrides.
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            app_config.provider.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            app_config.provider.model = model;
        }
        if let Ok(referrer) = std::env::var("HTTP_REFERER") {
            app_config.provider.referrer = Some(referrer);
        }
        if let Ok(title) = std::env::var("X_TITLE") {
            app_config.provider.title = Some(title);
        }

        Ok(app_config)
    }

    /// Validate the configuration for startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self
            .provider
            .api_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty())
        {
            anyhow::bail!(
                "GEMINI_API_KEY not found. Please set the environment variable:\n\
                 export GEMINI_API_KEY=your_api_key_here"
            );
        }
        Ok(())
    }

    /// Provider client settings derived from this configuration.
    #[must_use]
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.provider.api_key.clone().unwrap_or_default(),
            model: self.provider.model.clone(),
            base_url: self.provider.base_url.clone(),
            timeout_secs: self.provider.timeout_secs,
            max_retries: self.provider.max_retries,
            retry_delays: self.provider.retry_delays.clone(),
            rate_limit_buffer_secs: self.provider.rate_limit_buffer_secs,
            rate_limit_default_secs: self.provider.rate_limit_default_secs,
            referrer: self.provider.referrer.clone(),
            title: self.provider.title.clone(),
        }
    }

    /// Pipeline settings derived from this configuration.
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        let base = if self.research.grounded_retrieval {
            PipelineConfig::default()
        } else {
            PipelineConfig::legacy()
        };
        PipelineConfig {
            max_iterations: self.research.max_iterations.unwrap_or(base.max_iterations),
            num_variants: self.research.num_variants,
            evolution_steps: self.research.evolution_steps,
            structured_reports: self.research.structured_reports,
            sliding_window_size: self.research.sliding_window_size,
            thresholds: QualityThresholds {
                min_word_count: self.research.min_word_count,
                target_word_count: self.research.target_word_count,
                max_redundancy: self.research.max_redundancy,
                ..QualityThresholds::default()
            },
            ..base
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds. Research runs are long; this bounds the
    /// whole request, not individual provider calls.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    1800
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Provider (Gemini) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key. Required; absence fails startup.
    pub api_key: Option<String>,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Maximum attempts per operation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff schedule for transient errors, in seconds.
    #[serde(default = "default_retry_delays")]
    pub retry_delays: Vec<f64>,
    /// Buffer added to rate-limit retry-after hints, in seconds.
    #[serde(default = "default_rate_limit_buffer")]
    pub rate_limit_buffer_secs: f64,
    /// Wait when a rate-limit error has no retry-after hint, in seconds.
    #[serde(default = "default_rate_limit_default")]
    pub rate_limit_default_secs: f64,
    /// Optional `HTTP-Referer` pass-through header.
    pub referrer: Option<String>,
    /// Optional `X-Title` pass-through header.
    pub title: Option<String>,
}

fn default_model() -> String {
    "gemini-flash-latest".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delays() -> Vec<f64> {
    vec![1.0, 2.0, 4.0]
}

fn default_rate_limit_buffer() -> f64 {
    5.0
}

fn default_rate_limit_default() -> f64 {
    60.0
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_max_retries(),
            retry_delays: default_retry_delays(),
            rate_limit_buffer_secs: default_rate_limit_buffer(),
            rate_limit_default_secs: default_rate_limit_default(),
            referrer: None,
            title: None,
        }
    }
}

/// Research pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSettings {
    /// Search/synthesis/revision iterations. Defaults to 1 in grounded mode
    /// and 3 in legacy mode when unset.
    pub max_iterations: Option<usize>,
    /// Self-evolution variants for the plan phase.
    #[serde(default = "default_num_variants")]
    pub num_variants: usize,
    /// Self-evolution critique rounds.
    #[serde(default = "default_evolution_steps")]
    pub evolution_steps: usize,
    /// Generate the multi-chapter structured report.
    #[serde(default = "default_true")]
    pub structured_reports: bool,
    /// Use grounded generation for retrieval.
    #[serde(default = "default_true")]
    pub grounded_retrieval: bool,
    /// Recent sections kept in full when building section context.
    #[serde(default = "default_sliding_window")]
    pub sliding_window_size: usize,
    /// Minimum acceptable section word count.
    #[serde(default = "default_min_words")]
    pub min_word_count: usize,
    /// Section word count target.
    #[serde(default = "default_target_words")]
    pub target_word_count: usize,
    /// Maximum tolerated word overlap between sections.
    #[serde(default = "default_max_redundancy")]
    pub max_redundancy: f64,
}

fn default_num_variants() -> usize {
    1
}

fn default_evolution_steps() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_sliding_window() -> usize {
    5
}

fn default_min_words() -> usize {
    300
}

fn default_target_words() -> usize {
    350
}

fn default_max_redundancy() -> f64 {
    0.70
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_iterations: None,
            num_variants: default_num_variants(),
            evolution_steps: default_evolution_steps(),
            structured_reports: true,
            grounded_retrieval: true,
            sliding_window_size: default_sliding_window(),
            min_word_count: default_min_words(),
            target_word_count: default_target_words(),
            max_redundancy: default_max_redundancy(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to emit JSON-formatted logs.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_requires_api_key() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY not found"));

        let mut config = AppConfig::default();
        config.provider.api_key = Some("  ".to_string());
        assert!(config.validate().is_err());

        config.provider.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_defaults_by_mode() {
        let mut config = AppConfig::default();
        assert_eq!(config.pipeline_config().max_iterations, 1);
        assert!(config.pipeline_config().grounded_retrieval);

        config.research.grounded_retrieval = false;
        assert_eq!(config.pipeline_config().max_iterations, 3);
        assert!(!config.pipeline_config().grounded_retrieval);

        config.research.max_iterations = Some(7);
        assert_eq!(config.pipeline_config().max_iterations, 7);
    }

    #[test]
    fn test_threshold_overrides_flow_through() {
        let mut config = AppConfig::default();
        config.research.min_word_count = 250;
        config.research.max_redundancy = 0.5;
        let thresholds = config.pipeline_config().thresholds;
        assert_eq!(thresholds.min_word_count, 250);
        assert!((thresholds.max_redundancy - 0.5).abs() < 1e-9);
        // Untouched thresholds keep their documented defaults.
        assert!((thresholds.min_citation_density - 1.0 / 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_gemini_config_mapping() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("key".to_string());
        config.provider.model = "gemini-1.5-pro".to_string();
        let gemini = config.gemini_config();
        assert_eq!(gemini.api_key, "key");
        assert_eq!(gemini.model, "gemini-1.5-pro");
        assert_eq!(gemini.retry_delays, vec![1.0, 2.0, 4.0]);
        assert!((gemini.rate_limit_buffer_secs - 5.0).abs() < 1e-9);
    }
}
