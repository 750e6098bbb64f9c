//! Report structure generation.
//!
//! Analyzes the query and research context to produce a multi-perspective
//! chapter outline under a strict JSON output contract. Parse failures fall
//! back to a fixed three-chapter default so the pipeline always has a
//! structure to fill.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::GeminiClient;
use crate::error::ResearchResult;
use crate::prompts::{PERSPECTIVE_ANALYSIS_PROMPT, STRUCTURE_GENERATION_PROMPT, render};
use crate::report::{Chapter, ReportStructure, SectionSpec};

/// Standard analytical perspectives for multi-faceted analysis.
pub const STANDARD_PERSPECTIVES: [&str; 6] = [
    "Financial/Economic",
    "Technical/Operational",
    "Regulatory/Legal",
    "Strategic/Competitive",
    "Risk/Challenge",
    "Market/Industry",
];

const STRUCTURING_SYSTEM_PROMPT: &str =
    "You are a research report structuring expert. Output valid JSON only.";

const PLANNING_SYSTEM_PROMPT: &str =
    "You are a research planning expert. Output valid JSON only.";

/// A perspective ranked by relevance to the query.
#[derive(Debug, Clone, Deserialize)]
pub struct RankedPerspective {
    /// Perspective name.
    pub name: String,
    /// Relevance on a 1-10 scale.
    #[serde(default)]
    pub relevance_score: i64,
    /// Why this perspective matters for the query.
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
struct PerspectiveAnalysisJson {
    #[serde(default)]
    perspectives: Vec<RankedPerspective>,
}

#[derive(Debug, Deserialize)]
struct OutlineJson {
    executive_summary: OutlineSectionJson,
    chapters: Vec<OutlineChapterJson>,
    conclusion: OutlineSectionJson,
}

#[derive(Debug, Deserialize)]
struct OutlineSectionJson {
    title: String,
    guidance: String,
}

#[derive(Debug, Deserialize)]
struct OutlineChapterJson {
    title: String,
    perspective: String,
    sections: Vec<OutlineChapterSectionJson>,
}

#[derive(Debug, Deserialize)]
struct OutlineChapterSectionJson {
    title: String,
    guidance: String,
    #[serde(default = "default_section_words")]
    target_word_count: usize,
}

fn default_section_words() -> usize {
    350
}

/// Generates comprehensive report structures with multi-perspective analysis.
#[derive(Debug, Clone)]
pub struct StructureGenerator {
    client: Arc<GeminiClient>,
}

impl StructureGenerator {
    /// Create a structure generator over a shared client.
    #[must_use]
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }

    /// Rank the standard perspectives by relevance to the query.
    ///
    /// Parse failures fall back to the first four standard perspectives with
    /// equal weight.
    pub async fn analyze_query_perspectives(
        &self,
        query: &str,
    ) -> ResearchResult<Vec<RankedPerspective>> {
        info!(
            "Analyzing query for relevant perspectives: {}...",
            crate::chunker::truncate_chars(query, 100)
        );

        let prompt = render(PERSPECTIVE_ANALYSIS_PROMPT, &[("query", query)]);
        let response = self.client.complete(&prompt, PLANNING_SYSTEM_PROMPT).await?;

        match serde_json::from_str::<PerspectiveAnalysisJson>(extract_json(&response)) {
            Ok(analysis) => {
                let mut perspectives = analysis.perspectives;
                perspectives.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
                info!("Identified {} relevant perspectives", perspectives.len());
                for p in perspectives.iter().take(3) {
                    debug!(
                        "  - {} (score: {}): {}",
                        p.name,
                        p.relevance_score,
                        crate::chunker::truncate_chars(&p.rationale, 80)
                    );
                }
                Ok(perspectives)
            }
            Err(e) => {
                warn!("Failed to parse perspective analysis: {e}, using defaults");
                Ok(STANDARD_PERSPECTIVES
                    .iter()
                    .take(4)
                    .map(|name| RankedPerspective {
                        name: (*name).to_string(),
                        relevance_score: 5,
                        rationale: "Default perspective for comprehensive analysis".to_string(),
                    })
                    .collect())
            }
        }
    }

    /// Generate the complete report structure with chapters and sections.
    ///
    /// Provider failures propagate; JSON parse failures fall back to the
    /// default structure.
    pub async fn generate_chapter_outline(
        &self,
        query: &str,
        plan: &str,
        research_summary: &str,
    ) -> ResearchResult<ReportStructure> {
        info!("Generating comprehensive report structure...");

        let prompt = render(
            STRUCTURE_GENERATION_PROMPT,
            &[
                ("query", query),
                ("plan", plan),
                ("research_summary", research_summary),
            ],
        );
        let response = self
            .client
            .complete(&prompt, STRUCTURING_SYSTEM_PROMPT)
            .await?;

        match serde_json::from_str::<OutlineJson>(extract_json(&response)) {
            Ok(outline) => {
                let structure = build_report_structure(&outline);
                info!(
                    "Generated report structure: {} chapters, {} total sections, ~{} words",
                    structure.chapters.len(),
                    structure.total_sections(),
                    structure.estimated_word_count
                );
                Ok(structure)
            }
            Err(e) => {
                warn!("Failed to parse structure generation: {e}");
                warn!("Falling back to default report structure");
                Ok(default_structure())
            }
        }
    }
}

/// Build the typed structure from parsed outline JSON.
fn build_report_structure(outline: &OutlineJson) -> ReportStructure {
    let executive_summary = SectionSpec {
        title: outline.executive_summary.title.clone(),
        chapter_number: 0,
        section_number: 1,
        perspective: "Executive Summary".to_string(),
        guidance: outline.executive_summary.guidance.clone(),
        target_word_count: 400,
        max_output_tokens: 2048,
    };

    let chapters: Vec<Chapter> = outline
        .chapters
        .iter()
        .enumerate()
        .map(|(ch_idx, ch)| {
            let chapter_number = ch_idx + 1;
            let sections = ch
                .sections
                .iter()
                .enumerate()
                .map(|(sec_idx, sec)| SectionSpec {
                    title: sec.title.clone(),
                    chapter_number,
                    section_number: sec_idx + 1,
                    perspective: ch.perspective.clone(),
                    guidance: sec.guidance.clone(),
                    target_word_count: sec.target_word_count,
                    max_output_tokens: 2048,
                })
                .collect();
            Chapter {
                title: ch.title.clone(),
                perspective: ch.perspective.clone(),
                sections,
                chapter_number,
            }
        })
        .collect();

    let conclusion = SectionSpec {
        title: outline.conclusion.title.clone(),
        chapter_number: chapters.len() + 1,
        section_number: 1,
        perspective: "Conclusion".to_string(),
        guidance: outline.conclusion.guidance.clone(),
        target_word_count: 400,
        max_output_tokens: 2048,
    };

    let estimated_sections = 2 + chapters.iter().map(|c| c.sections.len()).sum::<usize>();
    let estimated_word_count =
        400 + chapters.iter().map(Chapter::total_target_words).sum::<usize>() + 400;

    ReportStructure {
        executive_summary,
        chapters,
        conclusion,
        estimated_word_count,
        estimated_sections,
        created_at: chrono::Utc::now(),
    }
}

/// Fixed three-chapter fallback used when outline parsing fails.
fn default_structure() -> ReportStructure {
    warn!("Using default 3-chapter report structure");

    let section = |title: &str,
                   chapter_number: usize,
                   section_number: usize,
                   perspective: &str,
                   guidance: &str| SectionSpec {
        title: title.to_string(),
        chapter_number,
        section_number,
        perspective: perspective.to_string(),
        guidance: guidance.to_string(),
        target_word_count: 350,
        max_output_tokens: 2048,
    };

    let chapters = vec![
        Chapter {
            title: "Background and Context".to_string(),
            perspective: "General Analysis".to_string(),
            sections: vec![
                section("Overview", 1, 1, "General Analysis", "Provide context and background"),
                section(
                    "Key Details",
                    1,
                    2,
                    "General Analysis",
                    "Present essential facts and details",
                ),
            ],
            chapter_number: 1,
        },
        Chapter {
            title: "Analysis and Implications".to_string(),
            perspective: "Strategic Analysis".to_string(),
            sections: vec![
                section(
                    "Primary Analysis",
                    2,
                    1,
                    "Strategic Analysis",
                    "Analyze main implications",
                ),
                section(
                    "Secondary Considerations",
                    2,
                    2,
                    "Strategic Analysis",
                    "Explore additional factors",
                ),
            ],
            chapter_number: 2,
        },
        Chapter {
            title: "Future Outlook".to_string(),
            perspective: "Forward-Looking".to_string(),
            sections: vec![
                section(
                    "Expected Developments",
                    3,
                    1,
                    "Forward-Looking",
                    "Discuss future trajectories",
                ),
                section(
                    "Potential Scenarios",
                    3,
                    2,
                    "Forward-Looking",
                    "Consider alternative outcomes",
                ),
            ],
            chapter_number: 3,
        },
    ];

    let executive_summary = SectionSpec {
        title: "Executive Summary".to_string(),
        chapter_number: 0,
        section_number: 1,
        perspective: "Executive Summary".to_string(),
        guidance: "Provide high-level synthesis of key findings".to_string(),
        target_word_count: 400,
        max_output_tokens: 2048,
    };
    let conclusion = SectionSpec {
        title: "Conclusion".to_string(),
        chapter_number: 4,
        section_number: 1,
        perspective: "Conclusion".to_string(),
        guidance: "Synthesize findings and provide recommendations".to_string(),
        target_word_count: 400,
        max_output_tokens: 2048,
    };

    let estimated_sections = 2 + chapters.iter().map(|c| c.sections.len()).sum::<usize>();
    let estimated_word_count =
        400 + chapters.iter().map(Chapter::total_target_words).sum::<usize>() + 400;

    ReportStructure {
        executive_summary,
        chapters,
        conclusion,
        estimated_word_count,
        estimated_sections,
        created_at: chrono::Utc::now(),
    }
}

/// Strip markdown code fences from an LLM response before JSON parsing.
fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let rest = &response[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    if let Some(start) = response.find("```") {
        let rest = &response[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    response.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_fenced() {
        let response = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(response), "{\"a\": 1}");

        let bare = "```\n{\"b\": 2}\n```";
        assert_eq!(extract_json(bare), "{\"b\": 2}");
    }

    #[test]
    fn test_build_structure_from_outline() {
        let outline: OutlineJson = serde_json::from_str(
            r#"{
                "executive_summary": {"title": "Executive Summary", "guidance": "Synthesize"},
                "chapters": [
                    {
                        "title": "Market Landscape",
                        "perspective": "Market/Industry",
                        "sections": [
                            {"title": "Current State", "guidance": "Describe", "target_word_count": 400},
                            {"title": "Trends", "guidance": "Identify"}
                        ]
                    },
                    {
                        "title": "Risks",
                        "perspective": "Risk/Challenge",
                        "sections": [
                            {"title": "Execution Risks", "guidance": "Assess"}
                        ]
                    }
                ],
                "conclusion": {"title": "Conclusion and Implications", "guidance": "Look ahead"}
            }"#,
        )
        .unwrap();

        let structure = build_report_structure(&outline);
        assert_eq!(structure.chapters.len(), 2);
        assert_eq!(structure.total_sections(), 5);
        assert_eq!(structure.estimated_sections, 5);
        assert_eq!(structure.executive_summary.chapter_number, 0);
        assert_eq!(structure.conclusion.chapter_number, 3);
        // Default target word count applies when the outline omits it.
        assert_eq!(structure.chapters[0].sections[1].target_word_count, 350);
        assert_eq!(structure.chapters[0].sections[0].target_word_count, 400);
        // 400 + (400 + 350) + 350 + 400 = 1900
        assert_eq!(structure.estimated_word_count, 1900);
    }

    #[test]
    fn test_default_structure_shape() {
        let structure = default_structure();
        assert_eq!(structure.chapters.len(), 3);
        assert_eq!(structure.total_sections(), 8);
        assert_eq!(structure.conclusion.chapter_number, 4);
        assert_eq!(structure.chapters[0].title, "Background and Context");
        assert_eq!(structure.chapters[2].title, "Future Outlook");
    }
}
