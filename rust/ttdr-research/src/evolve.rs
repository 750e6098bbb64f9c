//! Component-wise self-evolution.
//!
//! Improves a single-shot completion by generating diverse variants, running
//! critique-and-revise rounds over each, then merging the survivors into one
//! final text.

use tracing::debug;

use crate::client::GeminiClient;
use crate::error::ResearchResult;
use crate::prompts::{CRITIQUE_PROMPT, MERGE_PROMPT, render};

const REVISED_TEXT_SENTINEL: &str = "REVISED_TEXT:";

const CRITIQUE_SYSTEM_PROMPT: &str = "You are a critical and constructive reviewer.";

/// Run the variant/critique/merge loop over a prompt.
///
/// Returns the merged text together with the refined variants that fed it.
/// A critique response missing the `REVISED_TEXT:` sentinel leaves that
/// variant unchanged for the round.
pub async fn self_evolve(
    client: &GeminiClient,
    initial_prompt: &str,
    system_prompt: &str,
    num_variants: usize,
    evolution_steps: usize,
) -> ResearchResult<(String, Vec<String>)> {
    // Initial states: diverse completions of the same prompt.
    let mut variants = Vec::with_capacity(num_variants);
    for _ in 0..num_variants {
        variants.push(client.complete(initial_prompt, system_prompt).await?);
    }

    for step in 0..evolution_steps {
        let mut evolved = Vec::with_capacity(variants.len());
        for variant in &variants {
            let critique_prompt = render(
                CRITIQUE_PROMPT,
                &[("request", initial_prompt), ("variant", variant)],
            );
            let feedback = client
                .complete(&critique_prompt, CRITIQUE_SYSTEM_PROMPT)
                .await?;

            match extract_revised_text(&feedback) {
                Some(revised) => evolved.push(revised.to_string()),
                None => {
                    debug!("Critique response missing sentinel, keeping original variant");
                    evolved.push(variant.clone());
                }
            }
        }
        variants = evolved;
        debug!("Evolution step {} complete ({} variants)", step + 1, variants.len());
    }

    // Cross-over: merge the refined variants into one superior text.
    let merge_prompt = render(
        MERGE_PROMPT,
        &[
            ("request", initial_prompt),
            ("variants", &variants.join("---")),
        ],
    );
    let merged = client.complete(&merge_prompt, system_prompt).await?;

    Ok((merged, variants))
}

/// Extract the text after the last `REVISED_TEXT:` sentinel.
fn extract_revised_text(feedback: &str) -> Option<&str> {
    feedback
        .rfind(REVISED_TEXT_SENTINEL)
        .map(|idx| feedback[idx + REVISED_TEXT_SENTINEL.len()..].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_revised_text() {
        let feedback = "CRITIQUE: too vague\nSCORE: 6\nREVISED_TEXT: A sharper plan.";
        assert_eq!(extract_revised_text(feedback), Some("A sharper plan."));
    }

    #[test]
    fn test_extract_revised_text_uses_last_sentinel() {
        let feedback = "REVISED_TEXT: draft one\nREVISED_TEXT: draft two";
        assert_eq!(extract_revised_text(feedback), Some("draft two"));
    }

    #[test]
    fn test_extract_revised_text_missing_sentinel() {
        assert_eq!(extract_revised_text("no structured output here"), None);
    }
}
