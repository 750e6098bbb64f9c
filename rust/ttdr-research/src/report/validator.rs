//! Quality validation for generated sections.
//!
//! Checks depth, citation density, redundancy against previous sections, and
//! coherence, then decides whether a section earns a regeneration attempt.
//! Thresholds are configuration, not constants; the defaults mirror the
//! documented quality targets.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::report::{GeneratedSection, ValidationResult};

/// Substrings that mark placeholder or failed content (matched lowercase).
const PLACEHOLDER_INDICATORS: [&str; 5] = [
    "generation failed",
    "error:",
    "[content generation failed",
    "not implemented",
    "placeholder",
];

/// Quality thresholds for section validation.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// Minimum acceptable word count.
    pub min_word_count: usize,
    /// Target word count the depth score is measured against.
    pub target_word_count: usize,
    /// Minimum citations per 150 words (expressed per word: 1/150).
    pub min_citation_density: f64,
    /// Maximum tolerated word overlap with any previous section.
    pub max_redundancy: f64,
    /// Minimum coherence score.
    pub min_coherence: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_word_count: 300,
            target_word_count: 350,
            min_citation_density: 1.0 / 150.0,
            max_redundancy: 0.70,
            min_coherence: 0.8,
        }
    }
}

/// Validates section quality and determines regeneration needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityValidator {
    thresholds: QualityThresholds,
}

impl QualityValidator {
    /// Create a validator with the given thresholds.
    #[must_use]
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Validate a section against all quality metrics.
    #[must_use]
    pub fn validate_section(
        &self,
        section: &GeneratedSection,
        previous_sections: &[GeneratedSection],
    ) -> ValidationResult {
        debug!("Validating section {}", section.section_id());

        let t = &self.thresholds;
        let mut issues = Vec::new();

        // Depth: word count against the target.
        #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
        let depth_score = section.word_count as f64 / t.target_word_count as f64;
        if section.word_count < t.min_word_count {
            issues.push(format!(
                "Insufficient depth: {} words (minimum: {})",
                section.word_count, t.min_word_count
            ));
            warn!(
                "Section {} failed depth check: {} < {} words",
                section.section_id(),
                section.word_count,
                t.min_word_count
            );
        }

        // Citation density, compared per word.
        let citation_score = section.citation_density();
        #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
        let per_word_density = if section.word_count == 0 {
            0.0
        } else {
            section.citations_used.len() as f64 / section.word_count as f64
        };
        if per_word_density < t.min_citation_density {
            #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
            let target_citations = t.min_citation_density * section.word_count as f64;
            issues.push(format!(
                "Insufficient citations: {} citations for {} words (target: >={target_citations:.1})",
                section.citations_used.len(),
                section.word_count
            ));
            warn!(
                "Section {} failed citation check: density {:.3} < {:.3}",
                section.section_id(),
                per_word_density,
                t.min_citation_density
            );
        }

        // Redundancy: maximum Jaccard word overlap with any previous section.
        let redundancy_score = if previous_sections.is_empty() {
            0.0
        } else {
            max_overlap(section, previous_sections)
        };
        if redundancy_score > t.max_redundancy {
            issues.push(format!(
                "High redundancy: {:.0}% similarity with previous sections (threshold: {:.0}%)",
                redundancy_score * 100.0,
                t.max_redundancy * 100.0
            ));
            warn!(
                "Section {} failed redundancy check: {:.2} > {:.2}",
                section.section_id(),
                redundancy_score,
                t.max_redundancy
            );
        }

        // Coherence: placeholder detection plus minimal structure.
        let coherence_score = coherence(section);
        if coherence_score < t.min_coherence {
            issues.push(
                "Poor coherence: Section appears to be placeholder or error content".to_string(),
            );
            warn!("Section {} failed coherence check", section.section_id());
        }

        let is_valid = issues.is_empty();
        let result = ValidationResult {
            is_valid,
            section_id: section.section_id(),
            issues,
            depth_score,
            citation_score,
            redundancy_score,
            coherence_score,
        };

        if is_valid {
            info!(
                "Section {} passed validation (depth: {:.2}, citations: {:.3}, redundancy: {:.2}, coherence: {:.2})",
                result.section_id,
                result.depth_score,
                result.citation_score,
                result.redundancy_score,
                result.coherence_score
            );
        } else {
            warn!(
                "Section {} failed validation with {} issues",
                result.section_id,
                result.issues.len()
            );
        }

        result
    }

    /// Decide whether a section should be regenerated.
    ///
    /// Returns the regeneration guidance alongside the decision. After
    /// `max_attempts` the section is accepted regardless of issues.
    #[must_use]
    pub fn should_regenerate(
        &self,
        result: &ValidationResult,
        attempt: usize,
        max_attempts: usize,
    ) -> (bool, String) {
        if attempt >= max_attempts {
            info!(
                "Section {}: Max attempts ({max_attempts}) reached, accepting section",
                result.section_id
            );
            return (false, String::new());
        }

        if result.is_valid {
            return (false, String::new());
        }

        let guidance = result.regeneration_guidance();
        info!(
            "Section {}: Regeneration needed (attempt {attempt}/{max_attempts})\n{guidance}",
            result.section_id
        );

        (true, guidance)
    }
}

/// Maximum Jaccard similarity of lowercased word sets against previous
/// sections.
fn max_overlap(section: &GeneratedSection, previous: &[GeneratedSection]) -> f64 {
    let current: HashSet<String> = word_set(&section.content);

    let mut max_similarity: f64 = 0.0;
    for prev in previous {
        let prev_words = word_set(&prev.content);
        let intersection = current.intersection(&prev_words).count();
        let union = current.union(&prev_words).count();
        if union > 0 {
            #[allow(clippy::cast_precision_loss, reason = "word counts are small")]
            let similarity = intersection as f64 / union as f64;
            max_similarity = max_similarity.max(similarity);
        }
    }
    max_similarity
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(String::from).collect()
}

/// Tri-state coherence: 0 for placeholder/error content, 0.5 when paragraph
/// or sentence structure is missing, 1 otherwise.
fn coherence(section: &GeneratedSection) -> f64 {
    let content_lower = section.content.to_lowercase();
    for indicator in PLACEHOLDER_INDICATORS {
        if content_lower.contains(indicator) {
            return 0.0;
        }
    }

    let has_paragraphs = section.content.contains("\n\n") || section.content.contains('\n');
    let has_sentences = section.content.contains(". ") || section.content.contains(".\n");

    if has_paragraphs && has_sentences { 1.0 } else { 0.5 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SectionSpec;

    fn section(id: (usize, usize), content: &str, citations: usize) -> GeneratedSection {
        GeneratedSection {
            spec: SectionSpec {
                title: "Test".to_string(),
                chapter_number: id.0,
                section_number: id.1,
                perspective: "General".to_string(),
                guidance: String::new(),
                target_word_count: 350,
                max_output_tokens: 2048,
            },
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
            citations_used: (1..=citations).map(|n| format!("Source {n}")).collect(),
            generation_time_secs: 1.0,
            summary: String::new(),
        }
    }

    fn long_content(nonce: usize) -> String {
        let mut s = format!("Topic {nonce} overview paragraph with measurable detail.\n\n");
        for i in 0..40 {
            s.push_str(&format!(
                "Finding{nonce}x{i} shows consistent movement across metric{nonce}x{i} and cohort{nonce}x{i} groups. "
            ));
        }
        s
    }

    #[test]
    fn test_valid_section_passes() {
        let validator = QualityValidator::default();
        let s = section((1, 1), &long_content(1), 4);
        let result = validator.validate_section(&s, &[]);
        assert!(result.is_valid, "issues: {:?}", result.issues);
        assert!(result.depth_score > 0.85);
        assert!(result.citation_score >= 1.0);
        assert!(result.coherence_score >= 0.99);
    }

    #[test]
    fn test_short_section_fails_depth() {
        let validator = QualityValidator::default();
        let s = section((2, 1), "Short body. Only a few words here.\n\nSecond line.", 1);
        let result = validator.validate_section(&s, &[]);
        assert!(!result.is_valid);
        assert!(result.issues.iter().any(|i| i.starts_with("Insufficient depth")));
    }

    #[test]
    fn test_missing_citations_fail() {
        let validator = QualityValidator::default();
        let s = section((1, 2), &long_content(2), 0);
        let result = validator.validate_section(&s, &[]);
        assert!(!result.is_valid);
        assert!(result.issues.iter().any(|i| i.starts_with("Insufficient citations")));
    }

    #[test]
    fn test_redundant_section_fails() {
        let validator = QualityValidator::default();
        let body = long_content(3);
        let previous = section((1, 1), &body, 4);
        let duplicate = section((1, 2), &body, 4);
        let result = validator.validate_section(&duplicate, std::slice::from_ref(&previous));
        assert!(result.redundancy_score > 0.99);
        assert!(result.issues.iter().any(|i| i.starts_with("High redundancy")));
    }

    #[test]
    fn test_distinct_sections_have_low_overlap() {
        let validator = QualityValidator::default();
        let previous = section((1, 1), &long_content(4), 4);
        let fresh = section((1, 2), &long_content(5), 4);
        let result = validator.validate_section(&fresh, std::slice::from_ref(&previous));
        assert!(result.redundancy_score < QualityThresholds::default().max_redundancy);
    }

    #[test]
    fn test_placeholder_content_zeroes_coherence() {
        let validator = QualityValidator::default();
        let s = section(
            (2, 2),
            "# Title\n\n[Content generation failed for this section. Error: boom]",
            0,
        );
        let result = validator.validate_section(&s, &[]);
        assert_eq!(result.coherence_score, 0.0);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_zero_word_section_density_is_zero() {
        let s = section((1, 1), "", 0);
        assert_eq!(s.citation_density(), 0.0);
    }

    #[test]
    fn test_regeneration_policy() {
        let validator = QualityValidator::default();
        let invalid = ValidationResult {
            is_valid: false,
            section_id: "2.1".to_string(),
            issues: vec!["Insufficient depth: 120 words (minimum: 300)".to_string()],
            depth_score: 0.34,
            citation_score: 0.0,
            redundancy_score: 0.0,
            coherence_score: 1.0,
        };

        // First attempt with issues: regenerate with guidance.
        let (regen, guidance) = validator.should_regenerate(&invalid, 1, 2);
        assert!(regen);
        assert!(guidance.starts_with("Address the following issues in regeneration:"));

        // At the attempt ceiling: accept regardless.
        let (regen, guidance) = validator.should_regenerate(&invalid, 2, 2);
        assert!(!regen);
        assert!(guidance.is_empty());

        // Valid result: no regeneration.
        let valid = ValidationResult {
            is_valid: true,
            issues: Vec::new(),
            ..invalid
        };
        let (regen, _) = validator.should_regenerate(&valid, 1, 2);
        assert!(!regen);
    }
}
