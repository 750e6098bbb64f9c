//! Context management for iterative section generation.
//!
//! Keeps the prompt fed into each section under the token budget: the most
//! recent sections ride along in full, older ones as compressed summaries,
//! plus the top key insights and truncated research highlights.
//!
//! Token economics: a full section is ~500 tokens (350 words), a compressed
//! summary ≤200 tokens, and the whole context targets ≤8K tokens of a 20K
//! window (40%).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::GeminiClient;
use crate::prompts::{COMPRESSION_PROMPT, KEY_INSIGHTS_EXTRACTION_PROMPT, render};
use crate::report::{ContextSummary, GeneratedSection};

/// Average tokens per English word.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Context budget: 8K tokens of a 20K window (40%).
pub const MAX_CONTEXT_BUDGET: usize = 8000;

const SUMMARIZATION_SYSTEM_PROMPT: &str =
    "You are a concise summarization expert. Output summaries only.";

const INSIGHT_SYSTEM_PROMPT: &str =
    "You are an insight extraction expert. Output numbered lists only.";

/// Manages the context window budget across section generation.
#[derive(Debug, Clone)]
pub struct ContextManager {
    client: Arc<GeminiClient>,
    sliding_window_size: usize,
}

impl ContextManager {
    /// Create a context manager.
    ///
    /// `sliding_window_size` is the number of recent sections kept in full
    /// detail; 5 balances richness against budget.
    #[must_use]
    pub fn new(client: Arc<GeminiClient>, sliding_window_size: usize) -> Self {
        info!("Initialized ContextManager with sliding_window_size={sliding_window_size}");
        Self {
            client,
            sliding_window_size,
        }
    }

    /// Compress a section to a ≤200-token summary.
    ///
    /// Falls back to truncating the first 150 words when the provider call
    /// fails.
    pub async fn compress_section_to_summary(&self, section: &GeneratedSection) -> String {
        debug!(
            "Compressing section {} ({} words -> target <=150 words)",
            section.section_id(),
            section.word_count
        );

        let word_count = section.word_count.to_string();
        let prompt = render(
            COMPRESSION_PROMPT,
            &[
                ("section_title", section.spec.title.as_str()),
                ("section_id", &section.section_id()),
                ("perspective", section.spec.perspective.as_str()),
                ("word_count", &word_count),
                ("content", section.content.as_str()),
            ],
        );

        match self.client.complete(&prompt, SUMMARIZATION_SYSTEM_PROMPT).await {
            Ok(summary) => {
                let summary_words = summary.split_whitespace().count();
                debug!(
                    "Compressed {}: {} words -> {} words (~{} tokens)",
                    section.section_id(),
                    section.word_count,
                    summary_words,
                    estimate_tokens(&summary)
                );
                summary
            }
            Err(e) => {
                warn!("Compression failed for {}: {e}", section.section_id());
                let words: Vec<&str> = section.content.split_whitespace().take(150).collect();
                format!("{}...", words.join(" "))
            }
        }
    }

    /// Build the context for the next section generation.
    ///
    /// Recent sections (the sliding window) appear in full, older ones as
    /// their compressed summary (compressed on demand when missing). Key
    /// insights span all previous sections; research highlights are truncated
    /// to 2,000 chars. The budget is soft: an overrun logs a warning but the
    /// context is still used.
    pub async fn build_generation_context(
        &self,
        generated_sections: &[GeneratedSection],
        research_highlights: &str,
    ) -> ContextSummary {
        if generated_sections.is_empty() {
            let highlights = crate::chunker::truncate_chars(research_highlights, 1000);
            return ContextSummary {
                key_insights: Vec::new(),
                previous_sections: Vec::new(),
                research_highlights: highlights.to_string(),
                total_tokens: estimate_tokens(highlights),
            };
        }

        debug!(
            "Building context from {} previous sections (sliding window: {})",
            generated_sections.len(),
            self.sliding_window_size
        );

        let window_start = generated_sections
            .len()
            .saturating_sub(self.sliding_window_size);
        let (older, recent) = generated_sections.split_at(window_start);

        let mut previous_sections = Vec::with_capacity(generated_sections.len());
        for section in older {
            let summary = if section.summary.is_empty() {
                self.compress_section_to_summary(section).await
            } else {
                section.summary.clone()
            };
            previous_sections.push(format!(
                "[{}] {}: {summary}",
                section.section_id(),
                section.spec.title
            ));
        }
        for section in recent {
            previous_sections.push(format!(
                "[{}] {} (Full):\n{}",
                section.section_id(),
                section.spec.title,
                section.content
            ));
        }

        let key_insights = self.extract_key_insights(generated_sections).await;
        let highlights = crate::chunker::truncate_chars(research_highlights, 2000);

        let total_tokens = key_insights.iter().map(|s| estimate_tokens(s)).sum::<usize>()
            + previous_sections.iter().map(|s| estimate_tokens(s)).sum::<usize>()
            + estimate_tokens(highlights);

        let context = ContextSummary {
            key_insights,
            previous_sections,
            research_highlights: highlights.to_string(),
            total_tokens,
        };

        info!(
            "Context built: {} sections ({} compressed, {} full), {} key insights, ~{} tokens ({}% of budget)",
            context.previous_sections.len(),
            older.len(),
            recent.len(),
            context.key_insights.len(),
            context.total_tokens,
            100 * context.total_tokens / MAX_CONTEXT_BUDGET
        );

        if !context.is_within_budget(MAX_CONTEXT_BUDGET) {
            warn!(
                "Context exceeds budget: {} > {MAX_CONTEXT_BUDGET} tokens",
                context.total_tokens
            );
        }

        context
    }

    /// Extract the top 10 insights across all generated sections.
    ///
    /// Returns an empty list when extraction fails.
    async fn extract_key_insights(&self, sections: &[GeneratedSection]) -> Vec<String> {
        if sections.is_empty() {
            return Vec::new();
        }

        let mut sections_text: Vec<String> = Vec::with_capacity(sections.len());
        for section in sections {
            let body = if section.summary.is_empty() {
                section
                    .content
                    .split_whitespace()
                    .take(200)
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                section.summary.clone()
            };
            sections_text.push(format!(
                "[{}] {}: {body}",
                section.section_id(),
                section.spec.title
            ));
        }

        let mut combined = sections_text.join("\n\n");
        let combined_words: Vec<&str> = combined.split_whitespace().collect();
        if combined_words.len() > 3000 {
            combined = format!("{}...", combined_words[..3000].join(" "));
        }

        let prompt = render(KEY_INSIGHTS_EXTRACTION_PROMPT, &[("sections_text", &combined)]);

        match self.client.complete(&prompt, INSIGHT_SYSTEM_PROMPT).await {
            Ok(response) => {
                let insights = parse_numbered_list(&response);
                debug!(
                    "Extracted {} key insights from {} sections",
                    insights.len(),
                    sections.len()
                );
                insights
            }
            Err(e) => {
                warn!("Failed to extract key insights: {e}");
                Vec::new()
            }
        }
    }
}

/// Estimate tokens from word count, rounding up.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss,
        reason = "word counts are small and non-negative")]
    {
        (text.split_whitespace().count() as f64 * TOKENS_PER_WORD).ceil() as usize
    }
}

/// Parse a numbered (or bulleted) list response into at most 10 items.
fn parse_numbered_list(response: &str) -> Vec<String> {
    let mut insights = Vec::new();
    for line in response.lines() {
        let line = line.trim();
        let starts_numbered = line.chars().next().is_some_and(|c| c.is_ascii_digit());
        if line.is_empty() || !(starts_numbered || line.starts_with('-')) {
            continue;
        }
        let item = match line.split_once('.') {
            Some((_, rest)) => rest,
            None => line,
        };
        let item = item.trim_start_matches(['-', ' ']).trim();
        if !item.is_empty() {
            insights.push(item.to_string());
        }
    }
    insights.truncate(10);
    insights
}

/// Render a context summary into its prompt-ready form.
#[must_use]
pub fn format_context_for_prompt(context: &ContextSummary) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !context.key_insights.is_empty() {
        parts.push("**Key Insights from Previous Sections:**".to_string());
        for (i, insight) in context.key_insights.iter().enumerate() {
            parts.push(format!("{}. {insight}", i + 1));
        }
        parts.push(String::new());
    }

    if !context.previous_sections.is_empty() {
        parts.push("**Previous Sections:**".to_string());
        for section_text in &context.previous_sections {
            parts.push(section_text.clone());
            parts.push(String::new());
        }
    }

    if !context.research_highlights.is_empty() {
        parts.push("**Research Findings:**".to_string());
        parts.push(context.research_highlights.clone());
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SectionSpec;

    #[test]
    fn test_estimate_tokens_scales_words() {
        assert_eq!(estimate_tokens(""), 0);
        // 10 words * 1.3 = 13 tokens.
        assert_eq!(estimate_tokens("a b c d e f g h i j"), 13);
    }

    #[test]
    fn test_parse_numbered_list() {
        let response = "\
1. First insight here.
2. Second insight.
- Bulleted insight
Not part of the list.
3. Third one.";
        let insights = parse_numbered_list(response);
        assert_eq!(
            insights,
            vec![
                "First insight here.",
                "Second insight.",
                "Bulleted insight",
                "Third one."
            ]
        );
    }

    #[test]
    fn test_parse_numbered_list_caps_at_ten() {
        let response = (1..=15)
            .map(|i| format!("{i}. Insight {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_numbered_list(&response).len(), 10);
    }

    #[test]
    fn test_format_context_sections_order() {
        let context = ContextSummary {
            key_insights: vec!["Adoption is accelerating".to_string()],
            previous_sections: vec!["[1.1] Overview: summary text".to_string()],
            research_highlights: "Q: q1\nA: a1".to_string(),
            total_tokens: 42,
        };
        let formatted = format_context_for_prompt(&context);
        let insights_pos = formatted
            .find("**Key Insights from Previous Sections:**")
            .unwrap();
        let sections_pos = formatted.find("**Previous Sections:**").unwrap();
        let findings_pos = formatted.find("**Research Findings:**").unwrap();
        assert!(insights_pos < sections_pos);
        assert!(sections_pos < findings_pos);
        assert!(formatted.contains("1. Adoption is accelerating"));
    }

    #[test]
    fn test_format_context_empty() {
        assert!(format_context_for_prompt(&ContextSummary::default()).is_empty());
    }

    #[test]
    fn test_compression_fallback_is_monotone() {
        // Truncating an already-truncated summary cannot grow it.
        let spec = SectionSpec {
            title: "T".to_string(),
            chapter_number: 1,
            section_number: 1,
            perspective: "General".to_string(),
            guidance: String::new(),
            target_word_count: 350,
            max_output_tokens: 2048,
        };
        let content = (0..400).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let section = GeneratedSection {
            spec,
            content,
            word_count: 400,
            citations_used: Vec::new(),
            generation_time_secs: 0.0,
            summary: String::new(),
        };

        let first: Vec<&str> = section.content.split_whitespace().take(150).collect();
        let first = format!("{}...", first.join(" "));
        let second: Vec<&str> = first.split_whitespace().take(150).collect();
        let second = format!("{}...", second.join(" "));
        assert!(second.len() <= first.len());
    }
}
