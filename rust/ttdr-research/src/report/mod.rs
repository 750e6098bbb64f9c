//! Structured report generation.
//!
//! Data model plus the components that turn a refined research draft into a
//! multi-chapter, citation-bearing markdown report:
//!
//! - [`structure::StructureGenerator`]: multi-perspective chapter outline
//! - [`context::ContextManager`]: sliding-window context with compression
//! - [`section::SectionGenerator`]: one section at a time, under token limits
//! - [`validator::QualityValidator`]: depth/citation/redundancy/coherence gates
//! - [`assembler::ReportAssembler`]: final markdown assembly

pub mod assembler;
pub mod context;
pub mod section;
pub mod structure;
pub mod validator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Specification for a single section to be generated.
///
/// Each section is a focused analytical unit within a chapter, targeting
/// 300-500 words with a specific perspective and guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Section title.
    pub title: String,
    /// Chapter this section belongs to; 0 is the executive summary.
    pub chapter_number: usize,
    /// 1-based position within the chapter.
    pub section_number: usize,
    /// Analytical lens, e.g. "Financial/Economic".
    pub perspective: String,
    /// Instructions for what the section should cover.
    pub guidance: String,
    /// Target word count.
    #[serde(default = "default_target_word_count")]
    pub target_word_count: usize,
    /// Output token ceiling for generation.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_target_word_count() -> usize {
    350
}

fn default_max_output_tokens() -> u32 {
    2048
}

impl SectionSpec {
    /// Unique identifier for this section (e.g. `"2.3"`).
    #[must_use]
    pub fn full_id(&self) -> String {
        format!("{}.{}", self.chapter_number, self.section_number)
    }
}

/// Logical grouping of sections under one analytical perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title.
    pub title: String,
    /// Primary analytical lens for this chapter.
    pub perspective: String,
    /// Ordered sections (3-5 in generated outlines).
    pub sections: Vec<SectionSpec>,
    /// 1-based chapter number.
    pub chapter_number: usize,
}

impl Chapter {
    /// Total target word count across the chapter's sections.
    #[must_use]
    pub fn total_target_words(&self) -> usize {
        self.sections.iter().map(|s| s.target_word_count).sum()
    }
}

/// Complete outline for a structured multi-chapter report.
///
/// Immutable once created: executive summary, 2-7 chapters, conclusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStructure {
    /// Executive summary spec (chapter 0).
    pub executive_summary: SectionSpec,
    /// Main chapters.
    pub chapters: Vec<Chapter>,
    /// Conclusion spec (chapter `len + 1`).
    pub conclusion: SectionSpec,
    /// Estimated total word count.
    pub estimated_word_count: usize,
    /// Estimated section count including summary and conclusion.
    pub estimated_sections: usize,
    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ReportStructure {
    /// Total section count including executive summary and conclusion.
    #[must_use]
    pub fn total_sections(&self) -> usize {
        2 + self.chapters.iter().map(|c| c.sections.len()).sum::<usize>()
    }

    /// All section specs in generation order.
    #[must_use]
    pub fn all_sections(&self) -> Vec<&SectionSpec> {
        let mut sections = vec![&self.executive_summary];
        for chapter in &self.chapters {
            sections.extend(chapter.sections.iter());
        }
        sections.push(&self.conclusion);
        sections
    }
}

/// Section content and metadata after generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSection {
    /// The spec this section was generated from.
    pub spec: SectionSpec,
    /// Generated markdown content.
    pub content: String,
    /// Word count of the content (whitespace split).
    pub word_count: usize,
    /// Citation markers used, deduplicated (e.g. `"Source 1"`).
    pub citations_used: Vec<String>,
    /// Generation wall time in seconds.
    pub generation_time_secs: f64,
    /// Compressed summary for context propagation; empty until compressed.
    #[serde(default)]
    pub summary: String,
}

impl GeneratedSection {
    /// Unique identifier for this section (e.g. `"2.3"`).
    #[must_use]
    pub fn section_id(&self) -> String {
        self.spec.full_id()
    }

    /// Citations per 150 words; 0 for empty sections.
    #[must_use]
    pub fn citation_density(&self) -> f64 {
        if self.word_count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
        {
            (self.citations_used.len() as f64 / self.word_count as f64) * 150.0
        }
    }
}

/// Compressed context handed to the next section generation.
#[derive(Debug, Clone, Default)]
pub struct ContextSummary {
    /// Top insights across all previous sections (at most 10).
    pub key_insights: Vec<String>,
    /// Previous sections: older ones compressed, recent ones in full.
    pub previous_sections: Vec<String>,
    /// Relevant excerpts from the Q&A history.
    pub research_highlights: String,
    /// Estimated token count for this context.
    pub total_tokens: usize,
}

impl ContextSummary {
    /// Whether the context fits the token budget.
    #[must_use]
    pub fn is_within_budget(&self, budget_tokens: usize) -> bool {
        self.total_tokens <= budget_tokens
    }
}

/// Quality validation results for a generated section.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the section passed all checks.
    pub is_valid: bool,
    /// Section identifier.
    pub section_id: String,
    /// Human-readable issues found.
    pub issues: Vec<String>,
    /// Word count relative to the target.
    pub depth_score: f64,
    /// Citations per 150 words.
    pub citation_score: f64,
    /// Maximum word overlap with any previous section.
    pub redundancy_score: f64,
    /// 0 / 0.5 / 1.0 tri-state coherence.
    pub coherence_score: f64,
}

impl ValidationResult {
    /// Build regeneration guidance from the recorded issues.
    #[must_use]
    pub fn regeneration_guidance(&self) -> String {
        if self.issues.is_empty() {
            return String::new();
        }
        let mut parts = vec!["Address the following issues in regeneration:".to_string()];
        parts.extend(self.issues.iter().map(|issue| format!("- {issue}")));
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(chapter: usize, section: usize) -> SectionSpec {
        SectionSpec {
            title: "Test".to_string(),
            chapter_number: chapter,
            section_number: section,
            perspective: "General".to_string(),
            guidance: "Cover the basics".to_string(),
            target_word_count: 350,
            max_output_tokens: 2048,
        }
    }

    #[test]
    fn test_section_full_id() {
        assert_eq!(spec(2, 3).full_id(), "2.3");
        assert_eq!(spec(0, 1).full_id(), "0.1");
    }

    #[test]
    fn test_structure_counts() {
        let structure = ReportStructure {
            executive_summary: spec(0, 1),
            chapters: vec![
                Chapter {
                    title: "One".to_string(),
                    perspective: "General".to_string(),
                    sections: vec![spec(1, 1), spec(1, 2)],
                    chapter_number: 1,
                },
                Chapter {
                    title: "Two".to_string(),
                    perspective: "General".to_string(),
                    sections: vec![spec(2, 1)],
                    chapter_number: 2,
                },
            ],
            conclusion: spec(3, 1),
            estimated_word_count: 1850,
            estimated_sections: 5,
            created_at: Utc::now(),
        };
        assert_eq!(structure.total_sections(), 5);
        assert_eq!(structure.all_sections().len(), 5);
        assert_eq!(structure.all_sections()[0].full_id(), "0.1");
        assert_eq!(structure.all_sections()[4].full_id(), "3.1");
    }

    #[test]
    fn test_citation_density() {
        let mut section = GeneratedSection {
            spec: spec(1, 1),
            content: String::new(),
            word_count: 300,
            citations_used: vec!["Source 1".to_string(), "Source 2".to_string()],
            generation_time_secs: 1.0,
            summary: String::new(),
        };
        let density = section.citation_density();
        assert!((density - 1.0).abs() < 1e-9);

        section.word_count = 0;
        assert_eq!(section.citation_density(), 0.0);
    }

    #[test]
    fn test_regeneration_guidance_prefix() {
        let result = ValidationResult {
            is_valid: false,
            section_id: "2.1".to_string(),
            issues: vec!["Insufficient depth: 120 words (minimum: 300)".to_string()],
            depth_score: 0.34,
            citation_score: 0.0,
            redundancy_score: 0.0,
            coherence_score: 1.0,
        };
        let guidance = result.regeneration_guidance();
        assert!(guidance.starts_with("Address the following issues in regeneration:"));
        assert!(guidance.contains("- Insufficient depth"));
    }

    #[test]
    fn test_empty_guidance_when_valid() {
        let result = ValidationResult {
            is_valid: true,
            section_id: "1.1".to_string(),
            issues: Vec::new(),
            depth_score: 1.0,
            citation_score: 1.2,
            redundancy_score: 0.1,
            coherence_score: 1.0,
        };
        assert!(result.regeneration_guidance().is_empty());
    }
}
