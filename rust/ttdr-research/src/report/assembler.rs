//! Final report assembly.
//!
//! Concatenates generated sections into a single markdown document: executive
//! summary, chapters with their sections, conclusion, a citations section
//! grouped by chapter, and a metadata footer.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::report::{GeneratedSection, ReportStructure};

/// Assembles generated sections into the final markdown report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    /// Create a report assembler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Assemble all sections into the final markdown report.
    #[must_use]
    pub fn assemble_final_report(
        &self,
        structure: &ReportStructure,
        sections: &[GeneratedSection],
    ) -> String {
        info!(
            "Assembling final report: {} sections, {} chapters",
            sections.len(),
            structure.chapters.len()
        );

        let mut parts: Vec<String> = Vec::new();

        let find = |id: String| sections.iter().find(|s| s.section_id() == id);

        // 1. Executive summary.
        if let Some(exec) = find("0.1".to_string()) {
            parts.push("# Executive Summary\n".to_string());
            parts.push(exec.content.clone());
            parts.push("\n\n---\n".to_string());
        }

        // 2. Main chapters.
        for chapter in &structure.chapters {
            parts.push(format!(
                "\n# Chapter {}: {}\n",
                chapter.chapter_number, chapter.title
            ));
            parts.push(format!("*Perspective: {}*\n", chapter.perspective));

            for spec in &chapter.sections {
                if let Some(section) = find(spec.full_id()) {
                    parts.push(format!("\n## {} {}\n", spec.full_id(), spec.title));
                    parts.push(section.content.clone());
                    parts.push("\n".to_string());
                }
            }

            parts.push("\n---\n".to_string());
        }

        // 3. Conclusion.
        if let Some(conclusion) = find(structure.conclusion.full_id()) {
            parts.push("\n# Conclusion\n".to_string());
            parts.push(conclusion.content.clone());
            parts.push("\n\n---\n".to_string());
        }

        // 4. Citations grouped by chapter.
        parts.push(self.organize_citations_by_chapter(structure, sections));

        // 5. Metadata footer.
        parts.push(self.generate_metadata(structure, sections));

        let report = parts.concat();

        info!(
            "Final report assembled: {} characters, {} words",
            report.chars().count(),
            report.split_whitespace().count()
        );

        report
    }

    /// Build the citations section, grouped by chapter with order-preserving
    /// deduplication.
    #[must_use]
    pub fn organize_citations_by_chapter(
        &self,
        structure: &ReportStructure,
        sections: &[GeneratedSection],
    ) -> String {
        debug!("Organizing citations by chapter");

        let any_citations = sections.iter().any(|s| !s.citations_used.is_empty());
        if !any_citations {
            return "\n# Citations\n\nNo citations available for this report.\n".to_string();
        }

        let mut citations_by_chapter: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for section in sections {
            if !section.citations_used.is_empty() {
                citations_by_chapter
                    .entry(section.spec.chapter_number)
                    .or_default()
                    .extend(section.citations_used.iter().cloned());
            }
        }

        let mut parts = vec!["\n# Citations\n".to_string()];

        for (chapter_num, citations) in &citations_by_chapter {
            if *chapter_num == 0 {
                parts.push("\n## Executive Summary\n".to_string());
            } else if *chapter_num == structure.chapters.len() + 1 {
                parts.push("\n## Conclusion\n".to_string());
            } else if let Some(chapter) = structure.chapters.get(chapter_num - 1) {
                parts.push(format!("\n## Chapter {chapter_num}: {}\n", chapter.title));
            } else {
                parts.push(format!("\n## Chapter {chapter_num}\n"));
            }

            let mut seen = std::collections::HashSet::new();
            for citation in citations {
                if seen.insert(citation.clone()) {
                    parts.push(format!("- [{citation}]\n"));
                }
            }
        }

        parts.push("\n".to_string());
        parts.concat()
    }

    /// Build the report metadata footer.
    #[must_use]
    pub fn generate_metadata(
        &self,
        structure: &ReportStructure,
        sections: &[GeneratedSection],
    ) -> String {
        let total_words: usize = sections.iter().map(|s| s.word_count).sum();
        let total_sections = sections.len();
        let total_citations: usize = sections.iter().map(|s| s.citations_used.len()).sum();
        let total_time: f64 = sections.iter().map(|s| s.generation_time_secs).sum();

        #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
        let avg_words = if total_sections > 0 {
            total_words as f64 / total_sections as f64
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
        let citation_density = if total_words > 0 {
            (total_citations as f64 / total_words as f64) * 150.0
        } else {
            0.0
        };

        format!(
            "\n\n---\n\n## Report Metadata\n\n\
             **Generated Report Statistics:**\n\
             - **Total Word Count:** {} words\n\
             - **Total Sections:** {total_sections} sections ({} chapters)\n\
             - **Total Citations:** {total_citations} sources\n\
             - **Average Section Length:** {avg_words:.0} words\n\
             - **Citation Density:** {citation_density:.2} citations per 150 words\n\
             - **Total Generation Time:** {total_time:.1} seconds ({:.1} minutes)\n\n\
             **Report Structure:**\n\
             - Executive Summary: 1 section\n\
             - Main Chapters: {} chapters\n\
             - Conclusion: 1 section\n\n\
             *Generated by TTD-DR Structured Report Generation System*\n",
            group_thousands(total_words),
            structure.chapters.len(),
            total_time / 60.0,
            structure.chapters.len(),
        )
    }
}

/// Format an integer with comma thousands separators.
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Chapter, SectionSpec};

    fn spec(chapter: usize, section: usize, title: &str) -> SectionSpec {
        SectionSpec {
            title: title.to_string(),
            chapter_number: chapter,
            section_number: section,
            perspective: "General".to_string(),
            guidance: String::new(),
            target_word_count: 350,
            max_output_tokens: 2048,
        }
    }

    fn generated(s: SectionSpec, content: &str, citations: &[&str]) -> GeneratedSection {
        GeneratedSection {
            spec: s,
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
            citations_used: citations.iter().map(|c| (*c).to_string()).collect(),
            generation_time_secs: 2.0,
            summary: String::new(),
        }
    }

    fn sample_structure() -> ReportStructure {
        ReportStructure {
            executive_summary: spec(0, 1, "Executive Summary"),
            chapters: vec![Chapter {
                title: "Landscape".to_string(),
                perspective: "Market/Industry".to_string(),
                sections: vec![spec(1, 1, "Current State")],
                chapter_number: 1,
            }],
            conclusion: spec(2, 1, "Conclusion"),
            estimated_word_count: 1150,
            estimated_sections: 3,
            created_at: chrono::Utc::now(),
        }
    }

    fn sample_sections() -> Vec<GeneratedSection> {
        let structure = sample_structure();
        vec![
            generated(
                structure.executive_summary.clone(),
                "Summary body. [Source 1]",
                &["Source 1"],
            ),
            generated(
                structure.chapters[0].sections[0].clone(),
                "Chapter body. [Source 1] [Source 2]",
                &["Source 1", "Source 2"],
            ),
            generated(
                structure.conclusion.clone(),
                "Conclusion body. [Source 2]",
                &["Source 2"],
            ),
        ]
    }

    #[test]
    fn test_report_section_order() {
        let assembler = ReportAssembler::new();
        let report = assembler.assemble_final_report(&sample_structure(), &sample_sections());

        let exec = report.find("# Executive Summary").unwrap();
        let chapter = report.find("# Chapter 1: Landscape").unwrap();
        let section = report.find("## 1.1 Current State").unwrap();
        let conclusion = report.find("# Conclusion").unwrap();
        let citations = report.find("# Citations").unwrap();
        let metadata = report.find("## Report Metadata").unwrap();

        assert!(exec < chapter);
        assert!(chapter < section);
        assert!(section < conclusion);
        assert!(conclusion < citations);
        assert!(citations < metadata);
        assert!(report.contains("*Perspective: Market/Industry*"));
    }

    #[test]
    fn test_citations_section_is_deduplicated_union() {
        let assembler = ReportAssembler::new();
        let structure = sample_structure();
        let sections = sample_sections();
        let citations = assembler.organize_citations_by_chapter(&structure, &sections);

        assert!(citations.contains("## Executive Summary"));
        assert!(citations.contains("## Chapter 1: Landscape"));
        assert!(citations.contains("## Conclusion"));

        // Per-chapter lists are deduplicated; the union covers every marker.
        assert_eq!(citations.matches("- [Source 1]").count(), 2); // exec + chapter 1
        assert_eq!(citations.matches("- [Source 2]").count(), 2); // chapter 1 + conclusion

        let mut expected: Vec<String> = sections
            .iter()
            .flat_map(|s| s.citations_used.iter().cloned())
            .collect();
        expected.sort();
        expected.dedup();
        for marker in expected {
            assert!(citations.contains(&format!("[{marker}]")));
        }
    }

    #[test]
    fn test_no_citations_message() {
        let assembler = ReportAssembler::new();
        let structure = sample_structure();
        let sections = vec![generated(
            structure.executive_summary.clone(),
            "Body without markers.",
            &[],
        )];
        let citations = assembler.organize_citations_by_chapter(&structure, &sections);
        assert!(citations.contains("No citations available for this report."));
    }

    #[test]
    fn test_metadata_totals() {
        let assembler = ReportAssembler::new();
        let metadata = assembler.generate_metadata(&sample_structure(), &sample_sections());

        assert!(metadata.contains("**Total Sections:** 3 sections (1 chapters)"));
        assert!(metadata.contains("**Total Citations:** 4 sources"));
        assert!(metadata.contains("**Total Generation Time:** 6.0 seconds (0.1 minutes)"));
        assert!(metadata.contains("*Generated by TTD-DR Structured Report Generation System*"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
