//! Section generation for iterative report synthesis.
//!
//! Generates one section at a time under the output-token limit, extracts
//! inline citation markers, and substitutes a placeholder section on provider
//! failure so the validator can catch it instead of the pipeline aborting.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use tracing::{error, info};

use crate::chunker::truncate_chars;
use crate::client::GeminiClient;
use crate::prompts::{
    CONCLUSION_PROMPT, EXECUTIVE_SUMMARY_PROMPT, SECTION_GENERATION_PROMPT, render,
};
use crate::report::context::format_context_for_prompt;
use crate::report::{ContextSummary, GeneratedSection, ReportStructure, SectionSpec};

const SECTION_WRITER_SYSTEM_PROMPT: &str =
    "You are a detailed research report writer. Write comprehensive, well-cited sections.";

const SUMMARY_WRITER_SYSTEM_PROMPT: &str =
    "You are an executive summary writer. Provide clear, high-level syntheses.";

const CONCLUSION_WRITER_SYSTEM_PROMPT: &str =
    "You are a report conclusion writer. Synthesize findings and provide forward-looking analysis.";

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:Source\s+)?(\d+)\]").expect("citation pattern is valid"));

/// Generates individual report sections with context awareness.
#[derive(Debug, Clone)]
pub struct SectionGenerator {
    client: Arc<GeminiClient>,
}

impl SectionGenerator {
    /// Create a section generator over a shared client.
    #[must_use]
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }

    /// Generate a single report section.
    ///
    /// `regeneration_guidance` is appended to the section guidance on retry
    /// attempts. Provider failures produce a placeholder section rather than
    /// an error.
    pub async fn generate_section(
        &self,
        spec: &SectionSpec,
        context: &ContextSummary,
        research_data: &str,
        regeneration_guidance: &str,
    ) -> GeneratedSection {
        let start = Instant::now();

        info!(
            "Generating section {}: {} (target: {} words, perspective: {})",
            spec.full_id(),
            spec.title,
            spec.target_word_count,
            spec.perspective
        );

        let guidance = if regeneration_guidance.is_empty() {
            spec.guidance.clone()
        } else {
            format!("{}\n\nREGENERATION GUIDANCE:\n{regeneration_guidance}", spec.guidance)
        };

        let context_text = format_context_for_prompt(context);
        let chapter_title = format!("Chapter {}", spec.chapter_number);
        let target_words = spec.target_word_count.to_string();
        let max_tokens = spec.max_output_tokens.to_string();

        let prompt = render(
            SECTION_GENERATION_PROMPT,
            &[
                ("section_title", spec.title.as_str()),
                ("section_id", &spec.full_id()),
                ("chapter_title", &chapter_title),
                ("perspective", spec.perspective.as_str()),
                ("target_word_count", &target_words),
                ("guidance", &guidance),
                ("context_summary", &context_text),
                ("research_data", truncate_chars(research_data, 3000)),
                ("max_output_tokens", &max_tokens),
            ],
        );

        match self.client.complete(&prompt, SECTION_WRITER_SYSTEM_PROMPT).await {
            Ok(content) => {
                let section = build_section(spec.clone(), content, start);
                info!(
                    "Generated section {}: {} words, {} citations, {:.1}s",
                    section.section_id(),
                    section.word_count,
                    section.citations_used.len(),
                    section.generation_time_secs
                );
                section
            }
            Err(e) => {
                error!("Failed to generate section {}: {e}", spec.full_id());
                let fallback = format!(
                    "# {}\n\n[Content generation failed for this section. Error: {e}]\n\n\
                     This section was intended to cover: {}",
                    spec.title, spec.guidance
                );
                build_section(spec.clone(), fallback, start)
            }
        }
    }

    /// Generate the executive summary section.
    pub async fn generate_executive_summary(
        &self,
        structure: &ReportStructure,
        query: &str,
        research_data: &str,
    ) -> GeneratedSection {
        let start = Instant::now();

        info!("Generating Executive Summary");

        let outline = format_report_outline(structure);
        let prompt = render(
            EXECUTIVE_SUMMARY_PROMPT,
            &[
                ("query", query),
                ("report_outline", &outline),
                ("research_data", truncate_chars(research_data, 3000)),
            ],
        );

        match self.client.complete(&prompt, SUMMARY_WRITER_SYSTEM_PROMPT).await {
            Ok(content) => {
                let section = build_section(structure.executive_summary.clone(), content, start);
                info!(
                    "Generated Executive Summary: {} words, {} citations, {:.1}s",
                    section.word_count,
                    section.citations_used.len(),
                    section.generation_time_secs
                );
                section
            }
            Err(e) => {
                error!("Failed to generate Executive Summary: {e}");
                let fallback =
                    format!("# Executive Summary\n\n[Executive summary generation failed. Error: {e}]");
                build_section(structure.executive_summary.clone(), fallback, start)
            }
        }
    }

    /// Generate the conclusion section from all previously generated sections.
    pub async fn generate_conclusion(
        &self,
        structure: &ReportStructure,
        sections: &[GeneratedSection],
        query: &str,
    ) -> GeneratedSection {
        let start = Instant::now();

        info!("Generating Conclusion");

        let sections_summary = build_sections_summary(sections);
        let prompt = render(
            CONCLUSION_PROMPT,
            &[("query", query), ("sections_summary", &sections_summary)],
        );

        match self.client.complete(&prompt, CONCLUSION_WRITER_SYSTEM_PROMPT).await {
            Ok(content) => {
                let section = build_section(structure.conclusion.clone(), content, start);
                info!(
                    "Generated Conclusion: {} words, {} citations, {:.1}s",
                    section.word_count,
                    section.citations_used.len(),
                    section.generation_time_secs
                );
                section
            }
            Err(e) => {
                error!("Failed to generate Conclusion: {e}");
                let fallback = format!("# Conclusion\n\n[Conclusion generation failed. Error: {e}]");
                build_section(structure.conclusion.clone(), fallback, start)
            }
        }
    }
}

/// Assemble a [`GeneratedSection`] from generated content.
fn build_section(spec: SectionSpec, content: String, start: Instant) -> GeneratedSection {
    let word_count = content.split_whitespace().count();
    let citations_used = extract_citations(&content);
    GeneratedSection {
        spec,
        word_count,
        citations_used,
        generation_time_secs: start.elapsed().as_secs_f64(),
        summary: String::new(),
        content,
    }
}

/// Extract unique citation markers (`[Source N]` or `[N]`) as `"Source N"`.
#[must_use]
pub fn extract_citations(content: &str) -> Vec<String> {
    let mut unique: Vec<String> = CITATION_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|n| format!("Source {}", n.as_str()))
        .collect();
    unique.sort();
    unique.dedup();
    unique
}

/// Format the report structure as an outline for the executive summary prompt.
fn format_report_outline(structure: &ReportStructure) -> String {
    let mut lines = vec![format!("Total Sections: {}\n", structure.total_sections())];

    for chapter in &structure.chapters {
        lines.push(format!(
            "\nChapter {}: {} ({})",
            chapter.chapter_number, chapter.title, chapter.perspective
        ));
        for section in &chapter.sections {
            lines.push(format!("  - Section {}: {}", section.full_id(), section.title));
        }
    }

    lines.join("\n")
}

/// Summarize all sections for the conclusion prompt.
fn build_sections_summary(sections: &[GeneratedSection]) -> String {
    sections
        .iter()
        .map(|section| {
            let summary_text = if section.summary.is_empty() {
                section
                    .content
                    .split_whitespace()
                    .take(100)
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                section.summary.clone()
            };
            format!("[{}] {}:\n{summary_text}", section.section_id(), section.spec.title)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_citations_both_forms() {
        let content = "Growth accelerated [Source 1] and spending rose [2]. \
                       Oversight matured [Source 1].";
        assert_eq!(extract_citations(content), vec!["Source 1", "Source 2"]);
    }

    #[test]
    fn test_extract_citations_none() {
        assert!(extract_citations("No markers here.").is_empty());
    }

    #[test]
    fn test_extract_citations_sorted_unique() {
        let content = "[3] then [Source 1] then [3] then [2]";
        assert_eq!(
            extract_citations(content),
            vec!["Source 1", "Source 2", "Source 3"]
        );
    }

    #[test]
    fn test_word_count_matches_whitespace_split() {
        let content = "one two  three\nfour".to_string();
        let section = build_section(
            SectionSpec {
                title: "T".to_string(),
                chapter_number: 1,
                section_number: 1,
                perspective: "General".to_string(),
                guidance: String::new(),
                target_word_count: 350,
                max_output_tokens: 2048,
            },
            content.clone(),
            Instant::now(),
        );
        assert_eq!(section.word_count, content.split_whitespace().count());
        assert_eq!(section.word_count, 4);
    }

    #[test]
    fn test_sections_summary_prefers_compressed() {
        let spec = SectionSpec {
            title: "Overview".to_string(),
            chapter_number: 1,
            section_number: 1,
            perspective: "General".to_string(),
            guidance: String::new(),
            target_word_count: 350,
            max_output_tokens: 2048,
        };
        let section = GeneratedSection {
            spec,
            content: "full content words".to_string(),
            word_count: 3,
            citations_used: Vec::new(),
            generation_time_secs: 0.0,
            summary: "compressed form".to_string(),
        };
        let summary = build_sections_summary(&[section]);
        assert!(summary.contains("[1.1] Overview:\ncompressed form"));
        assert!(!summary.contains("full content"));
    }
}
