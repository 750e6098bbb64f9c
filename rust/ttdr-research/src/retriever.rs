//! Retrieval facade over the Gemini client.
//!
//! Two routes: grounded generation (the canonical path — one provider call
//! that searches, synthesizes and cites) and the legacy
//! search → chunk → rerank route kept behind a pipeline configuration flag.

use std::sync::Arc;

use tracing::{error, warn};

use crate::chunker::{Chunk, ChunkOptions, Document, chunk_document};
use crate::client::{Citation, GeminiClient, RankedChunk};
use crate::error::ResearchResult;
use crate::prompts::{GROUNDED_RETRIEVAL_CONTEXT_PROMPT, render};

/// Stateless retrieval facade.
#[derive(Debug, Clone)]
pub struct Retriever {
    client: Arc<GeminiClient>,
}

impl Retriever {
    /// Create a retriever over a shared client.
    #[must_use]
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }

    /// Retrieve and synthesize in a single grounded-generation call.
    ///
    /// Returns the synthesized answer and its citations. Zero grounding
    /// results produce an answer with an empty citation list rather than an
    /// error; provider failures propagate.
    pub async fn retrieve_with_grounded_generation(
        &self,
        query: &str,
    ) -> ResearchResult<(String, Vec<Citation>)> {
        let context_prompt = render(
            GROUNDED_RETRIEVAL_CONTEXT_PROMPT,
            &[("search_query", query)],
        );
        self.client
            .complete_with_search(query, &context_prompt)
            .await
    }

    /// Legacy route: provider search, chunk each result, rerank all chunks.
    ///
    /// Returns the top `top_k` chunks with rank scores. If reranking fails,
    /// the unranked chunk prefix is returned instead so the iteration can
    /// still proceed.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        search_top_k: usize,
    ) -> ResearchResult<Vec<RankedChunk>> {
        let results = self.client.search(query, search_top_k).await?;
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let opts = ChunkOptions::default();
        let mut chunks: Vec<Chunk> = Vec::new();
        for (idx, result) in results.into_iter().enumerate() {
            let doc = Document {
                id: Some(format!("search-{idx}")),
                url: Some(result.url),
                text: result.text,
                token_count: None,
            };
            let mut doc_chunks = chunk_document(&doc, &opts);
            // Re-index across documents so rerank scores map back uniquely.
            for chunk in &mut doc_chunks {
                chunk.chunk_id = chunks.len() + chunk.chunk_id;
            }
            chunks.extend(doc_chunks);
        }

        if chunks.is_empty() {
            warn!("Search results produced no chunks for query: {query}");
            return Ok(Vec::new());
        }

        match self.client.rerank_chunks(query, &chunks, top_k).await {
            Ok(ranked) => Ok(ranked),
            Err(e) => {
                error!("Error reranking chunks: {e}");
                Ok(chunks
                    .into_iter()
                    .take(top_k)
                    .map(|chunk| RankedChunk {
                        chunk_id: chunk.chunk_id,
                        text: chunk.text,
                        score: 0.0,
                        url: chunk.url,
                        token_count: chunk.token_count,
                    })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grounded_context_prompt_embeds_query() {
        let rendered = render(
            GROUNDED_RETRIEVAL_CONTEXT_PROMPT,
            &[("search_query", "solid-state batteries")],
        );
        assert!(rendered.starts_with(
            "You are researching to answer this query: solid-state batteries"
        ));
        assert!(rendered.contains("authoritative sources"));
    }
}
