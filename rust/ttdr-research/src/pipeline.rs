//! The test-time diffusion research loop.
//!
//! Drives a request through plan → initial draft → N× {search-query,
//! grounded synthesis, draft revision} → structured (or legacy single-pass)
//! report generation. The pipeline owns all per-request state; the shared
//! [`GeminiClient`] is the only cross-request collaborator.
//!
//! Every update both appends to the intermediate log and emits exactly one
//! event through the sink, so clients see a monotonically growing narrative.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::client::GeminiClient;
use crate::error::ResearchResult;
use crate::events::{PipelineEvent, ProgressUpdate, STEP_SEPARATOR, UpdateSink};
use crate::evolve::self_evolve;
use crate::prompts::{
    ANSWER_SYNTHESIS_PROMPT, DRAFT_REVISION_PROMPT, FINAL_REPORT_PROMPT, INITIAL_DRAFT_PROMPT,
    PLAN_PROMPT, RESEARCH_ASSISTANT_SYSTEM_PROMPT, SEARCH_QUERY_GEN_PROMPT, render,
};
use crate::report::assembler::ReportAssembler;
use crate::report::context::ContextManager;
use crate::report::section::SectionGenerator;
use crate::report::structure::StructureGenerator;
use crate::report::validator::{QualityThresholds, QualityValidator};
use crate::report::{GeneratedSection, ReportStructure, SectionSpec};
use crate::retriever::Retriever;

const PLANNER_SYSTEM_PROMPT: &str = "You are a strategic research planner.";

/// Maximum generation attempts per section (first try + one regeneration).
const MAX_SECTION_ATTEMPTS: usize = 2;

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Self-evolution variants for the plan phase.
    pub num_variants: usize,
    /// Self-evolution critique rounds.
    pub evolution_steps: usize,
    /// Search/synthesis/revision iterations.
    pub max_iterations: usize,
    /// Provider search breadth on the legacy route.
    pub search_top_k: usize,
    /// Chunks kept after reranking on the legacy route.
    pub rerank_top_k: usize,
    /// Generate the multi-chapter structured report (vs. legacy single pass).
    pub structured_reports: bool,
    /// Use grounded generation for retrieval (vs. legacy search/chunk/rerank).
    pub grounded_retrieval: bool,
    /// Recent sections kept in full when building section context.
    pub sliding_window_size: usize,
    /// Section quality thresholds.
    pub thresholds: QualityThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_variants: 1,
            evolution_steps: 1,
            max_iterations: 1,
            search_top_k: 50,
            rerank_top_k: 20,
            structured_reports: true,
            grounded_retrieval: true,
            sliding_window_size: 5,
            thresholds: QualityThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults for the legacy search/chunk/rerank mode, which needs more
    /// iterations to accumulate comparable evidence.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            max_iterations: 3,
            grounded_retrieval: false,
            ..Self::default()
        }
    }
}

/// One step of the research history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Narrative description of the step.
    pub description: String,
    /// Search query, when this entry records a retrieval round.
    pub query: Option<String>,
    /// Synthesized answer; always present when `query` is.
    pub answer: Option<String>,
}

impl HistoryEntry {
    fn note(description: String) -> Self {
        Self {
            description,
            query: None,
            answer: None,
        }
    }
}

/// The TTD-DR research pipeline for a single request.
pub struct ResearchPipeline {
    client: Arc<GeminiClient>,
    config: PipelineConfig,
    sink: Box<dyn UpdateSink>,

    retriever: Retriever,
    structure_generator: StructureGenerator,
    context_manager: ContextManager,
    section_generator: SectionGenerator,
    validator: QualityValidator,
    assembler: ReportAssembler,

    plan: String,
    draft: String,
    history: Vec<HistoryEntry>,
    citations: Vec<String>,
    intermediate_log: Vec<String>,
    structure: Option<ReportStructure>,
    sections: Vec<GeneratedSection>,
}

impl std::fmt::Debug for ResearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchPipeline")
            .field("config", &self.config)
            .field("history_len", &self.history.len())
            .field("citations", &self.citations.len())
            .field("sections", &self.sections.len())
            .finish_non_exhaustive()
    }
}

impl ResearchPipeline {
    /// Create a pipeline over a shared client.
    #[must_use]
    pub fn new(client: Arc<GeminiClient>, config: PipelineConfig, sink: Box<dyn UpdateSink>) -> Self {
        let retriever = Retriever::new(Arc::clone(&client));
        let structure_generator = StructureGenerator::new(Arc::clone(&client));
        let context_manager = ContextManager::new(Arc::clone(&client), config.sliding_window_size);
        let section_generator = SectionGenerator::new(Arc::clone(&client));
        let validator = QualityValidator::new(config.thresholds);

        if config.structured_reports {
            info!("Structured report generation ENABLED");
        }

        Self {
            client,
            config,
            sink,
            retriever,
            structure_generator,
            context_manager,
            section_generator,
            validator,
            assembler: ReportAssembler::new(),
            plan: String::new(),
            draft: String::new(),
            history: Vec::new(),
            citations: Vec::new(),
            intermediate_log: Vec::new(),
            structure: None,
            sections: Vec::new(),
        }
    }

    /// Run the full research loop for a query.
    ///
    /// Terminates with a `Final` event through the sink on success. Provider
    /// failures in the plan, draft, query-generation, revision or structure
    /// phases abort the request; the caller is responsible for surfacing the
    /// error to the client as a terminal event.
    pub async fn run(&mut self, query: &str) -> ResearchResult<()> {
        self.generate_research_plan(query).await?;
        self.generate_initial_draft(query).await?;
        self.perform_iterative_search_and_synthesis(query).await?;

        if self.config.structured_reports {
            self.generate_report_structure(query).await?;
            self.generate_structured_report(query).await;
        } else {
            self.generate_final_report(query).await?;
        }

        Ok(())
    }

    /// Append the event's description to the log and emit exactly one update.
    fn emit(&mut self, event: PipelineEvent) {
        if let Some(description) = event.description() {
            self.intermediate_log.push(description.to_string());
        }

        let steps = self.intermediate_log.join(STEP_SEPARATOR);
        let intermediate_steps = if steps.is_empty() { None } else { Some(steps) };

        let update = match event {
            PipelineEvent::Plan { .. }
            | PipelineEvent::Draft { .. }
            | PipelineEvent::Section { .. } => ProgressUpdate {
                intermediate_steps,
                final_report: None,
                is_intermediate: true,
                citations: None,
                complete: false,
                error: None,
            },
            PipelineEvent::Iteration { citations, .. } => ProgressUpdate {
                intermediate_steps,
                final_report: None,
                is_intermediate: true,
                citations,
                complete: false,
                error: None,
            },
            PipelineEvent::Final { report, citations } => ProgressUpdate {
                intermediate_steps,
                final_report: Some(report),
                is_intermediate: false,
                citations: Some(citations),
                complete: true,
                error: None,
            },
            PipelineEvent::Error { message } => ProgressUpdate::fatal(message),
        };

        self.sink.send(update);
    }

    /// Plan phase: self-evolved research plan.
    async fn generate_research_plan(&mut self, query: &str) -> ResearchResult<()> {
        self.emit(PipelineEvent::Plan {
            description: "Generating initial research plan...".to_string(),
        });

        let plan_prompt = render(PLAN_PROMPT, &[("query", query)]);
        let (plan, _variants) = self_evolve(
            &self.client,
            &plan_prompt,
            PLANNER_SYSTEM_PROMPT,
            self.config.num_variants,
            self.config.evolution_steps,
        )
        .await?;

        self.plan = plan;
        let description = format!("**Research Plan Generated:**\n{}", self.plan);
        self.history.push(HistoryEntry::note(description.clone()));
        self.emit(PipelineEvent::Plan { description });
        Ok(())
    }

    /// Initial draft phase: single-shot completion from internal knowledge.
    async fn generate_initial_draft(&mut self, query: &str) -> ResearchResult<()> {
        self.emit(PipelineEvent::Draft {
            description: "Generating initial draft from internal knowledge...".to_string(),
        });

        let draft_prompt = render(INITIAL_DRAFT_PROMPT, &[("query", query)]);
        self.draft = self
            .client
            .complete(&draft_prompt, RESEARCH_ASSISTANT_SYSTEM_PROMPT)
            .await?;

        let description = format!("**Initial Draft Created:**\n{}...", preview(&self.draft));
        self.history.push(HistoryEntry::note(description.clone()));
        self.emit(PipelineEvent::Draft { description });
        Ok(())
    }

    /// Iterative denoising loop.
    async fn perform_iterative_search_and_synthesis(&mut self, query: &str) -> ResearchResult<()> {
        for iteration in 0..self.config.max_iterations {
            let search_query = self.generate_search_query(query, iteration).await?;
            if search_query.trim().is_empty() {
                warn!("No valid search query generated, skipping iteration");
                continue;
            }
            let answer = self.retrieve_and_synthesize(&search_query).await;
            self.revise_draft(query, &search_query, &answer, iteration)
                .await?;
        }
        Ok(())
    }

    /// Formulate the next search query.
    ///
    /// The first iteration sends the user's raw query verbatim: the initial
    /// draft is model-only and can steer a generated query off course. Later
    /// iterations ask the model for a targeted query over the evolving state.
    async fn generate_search_query(
        &mut self,
        query: &str,
        iteration: usize,
    ) -> ResearchResult<String> {
        self.emit(PipelineEvent::Iteration {
            description: format!(
                "**Iteration {}/{}:** Generating next search query...",
                iteration + 1,
                self.config.max_iterations
            ),
            citations: None,
        });

        if iteration == 0 {
            self.emit(PipelineEvent::Iteration {
                description: format!("**Searching for (direct query):** `{query}`"),
                citations: None,
            });
            return Ok(query.to_string());
        }

        let history = self.qa_history_text("\n", "Q: ", "\nA: ");
        let prompt = render(
            SEARCH_QUERY_GEN_PROMPT,
            &[
                ("query", query),
                ("plan", &self.plan),
                ("draft", &self.draft),
                ("history", &history),
            ],
        );
        let search_query = self
            .client
            .complete(&prompt, RESEARCH_ASSISTANT_SYSTEM_PROMPT)
            .await?
            .trim()
            .to_string();

        self.emit(PipelineEvent::Iteration {
            description: format!("**Searching for (generated query):** `{search_query}`"),
            citations: None,
        });
        Ok(search_query)
    }

    /// Retrieve and synthesize an answer for the search query.
    ///
    /// A provider failure here is recovered locally with a placeholder answer
    /// so one failed retrieval does not abort the request; the placeholder is
    /// still recorded in history but contributes no citations.
    async fn retrieve_and_synthesize(&mut self, search_query: &str) -> String {
        if self.config.grounded_retrieval {
            self.emit(PipelineEvent::Iteration {
                description:
                    "Searching web and synthesizing answer with Gemini grounded generation..."
                        .to_string(),
                citations: None,
            });

            let retrieved = self
                .retriever
                .retrieve_with_grounded_generation(search_query)
                .await;
            match retrieved {
                Ok((answer, citation_list)) => {
                    let urls: Vec<String> =
                        citation_list.into_iter().map(|c| c.url).collect();
                    self.citations.extend(urls.iter().cloned());

                    self.emit(PipelineEvent::Iteration {
                        description: format!(
                            "**Grounded generation complete:** {} sources used. Synthesizing answer...",
                            urls.len()
                        ),
                        citations: if urls.is_empty() { None } else { Some(urls) },
                    });

                    self.record_answer(search_query, &answer);
                    answer
                }
                Err(e) => self.recover_retrieval_failure(search_query, &e.to_string()),
            }
        } else {
            self.legacy_retrieve_and_synthesize(search_query).await
        }
    }

    /// Legacy route: search, chunk, rerank, then synthesize over the chunks.
    async fn legacy_retrieve_and_synthesize(&mut self, search_query: &str) -> String {
        self.emit(PipelineEvent::Iteration {
            description: "Searching, chunking and reranking documents...".to_string(),
            citations: None,
        });

        let retrieved = self
            .retriever
            .retrieve(search_query, self.config.rerank_top_k, self.config.search_top_k)
            .await;
        let chunks = match retrieved {
            Ok(chunks) => chunks,
            Err(e) => return self.recover_retrieval_failure(search_query, &e.to_string()),
        };

        let urls: Vec<String> = chunks.iter().filter_map(|c| c.url.clone()).collect();
        self.citations.extend(urls.iter().cloned());

        self.emit(PipelineEvent::Iteration {
            description: format!("**Retrieved {} reranked chunks.** Synthesizing answer...", chunks.len()),
            citations: if urls.is_empty() { None } else { Some(urls) },
        });

        let documents = chunks
            .iter()
            .map(|c| format!("ID: {}\nText: {}", c.chunk_id, c.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let synthesis_prompt = render(
            ANSWER_SYNTHESIS_PROMPT,
            &[("search_query", search_query), ("documents", &documents)],
        );

        let synthesized = self_evolve(
            &self.client,
            &synthesis_prompt,
            RESEARCH_ASSISTANT_SYSTEM_PROMPT,
            self.config.num_variants,
            self.config.evolution_steps,
        )
        .await;
        match synthesized {
            Ok((answer, _)) => {
                self.record_answer(search_query, &answer);
                answer
            }
            Err(e) => self.recover_retrieval_failure(search_query, &e.to_string()),
        }
    }

    /// Record a Q&A round in history and stream the synthesized answer.
    fn record_answer(&mut self, search_query: &str, answer: &str) {
        let description = format!("**Synthesized Answer for `{search_query}`:**\n{answer}");
        self.history.push(HistoryEntry {
            description: description.clone(),
            query: Some(search_query.to_string()),
            answer: Some(answer.to_string()),
        });
        self.emit(PipelineEvent::Iteration {
            description,
            citations: None,
        });
    }

    /// Keep the loop advancing after a failed retrieval.
    fn recover_retrieval_failure(&mut self, search_query: &str, message: &str) -> String {
        error!("Error in grounded generation: {message}");
        let answer = format!("Unable to retrieve web information for this query: {message}");
        self.emit(PipelineEvent::Iteration {
            description: format!("**Warning:** {answer}"),
            citations: None,
        });
        self.history.push(HistoryEntry {
            description: format!("**Warning:** {answer}"),
            query: Some(search_query.to_string()),
            answer: Some(answer.clone()),
        });
        answer
    }

    /// Revise the draft with newly synthesized information.
    async fn revise_draft(
        &mut self,
        query: &str,
        search_query: &str,
        answer: &str,
        iteration: usize,
    ) -> ResearchResult<()> {
        self.emit(PipelineEvent::Iteration {
            description: "Revising draft with new information...".to_string(),
            citations: None,
        });

        let prompt = render(
            DRAFT_REVISION_PROMPT,
            &[
                ("query", query),
                ("draft", &self.draft),
                ("search_query", search_query),
                ("new_answer", answer),
            ],
        );
        self.draft = self
            .client
            .complete(&prompt, RESEARCH_ASSISTANT_SYSTEM_PROMPT)
            .await?;

        let description = format!(
            "**Revised Draft {}:**\n{}...",
            iteration + 1,
            preview(&self.draft)
        );
        self.history.push(HistoryEntry::note(description.clone()));
        self.emit(PipelineEvent::Iteration {
            description,
            citations: None,
        });
        Ok(())
    }

    /// Legacy single-pass final report.
    async fn generate_final_report(&mut self, query: &str) -> ResearchResult<()> {
        self.emit(PipelineEvent::Section {
            description: "All research steps complete. Generating final report...".to_string(),
        });

        let history = self.qa_history_text("\n\n", "**Question:** ", "\n**Answer:** ");
        let citations = self.citations.join("\n");
        let prompt = render(
            FINAL_REPORT_PROMPT,
            &[
                ("query", query),
                ("plan", &self.plan),
                ("draft", &self.draft),
                ("history", &history),
                ("citations", &citations),
            ],
        );

        let report = self
            .client
            .complete(&prompt, RESEARCH_ASSISTANT_SYSTEM_PROMPT)
            .await?;

        self.intermediate_log.push("Final report generated.".to_string());
        self.emit(PipelineEvent::Final {
            report,
            citations: self.citations.clone(),
        });
        Ok(())
    }

    /// Structure phase: produce the chapter outline.
    async fn generate_report_structure(&mut self, query: &str) -> ResearchResult<()> {
        self.emit(PipelineEvent::Section {
            description: "Generating comprehensive report structure...".to_string(),
        });

        let research_summary = self
            .history
            .iter()
            .filter_map(|entry| {
                let (query, answer) = (entry.query.as_ref()?, entry.answer.as_ref()?);
                Some(format!(
                    "Q: {query}\nA: {}...",
                    crate::chunker::truncate_chars(answer, 200)
                ))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let structure = self
            .structure_generator
            .generate_chapter_outline(query, &self.plan, &research_summary)
            .await?;

        let description = format!(
            "**Report Structure Generated:**\n- {} total sections\n- {} chapters\n- ~{} target words",
            structure.total_sections(),
            structure.chapters.len(),
            structure.estimated_word_count
        );
        self.structure = Some(structure);
        self.emit(PipelineEvent::Section { description });
        Ok(())
    }

    /// Structured report phase: section-by-section synthesis and assembly.
    async fn generate_structured_report(&mut self, query: &str) {
        let Some(structure) = self.structure.clone() else {
            return;
        };

        self.emit(PipelineEvent::Section {
            description: "Starting structured report generation...".to_string(),
        });

        let research_data = self.prepare_research_data();

        // 1. Executive summary.
        let exec_summary = self
            .section_generator
            .generate_executive_summary(&structure, query, &research_data)
            .await;
        self.emit(PipelineEvent::Section {
            description: format!(
                "Executive Summary generated ({} words)",
                exec_summary.word_count
            ),
        });
        self.sections.push(exec_summary);

        // 2. Chapter sections, validated as they are produced.
        let total_main_sections: usize =
            structure.chapters.iter().map(|c| c.sections.len()).sum();
        let mut current_section = 0;

        for chapter in &structure.chapters {
            self.emit(PipelineEvent::Section {
                description: format!(
                    "Starting Chapter {}: {}",
                    chapter.chapter_number, chapter.title
                ),
            });

            for spec in &chapter.sections {
                current_section += 1;
                let progress = format!("Section {current_section}/{total_main_sections}");

                let mut section = self
                    .generate_section_with_validation(spec, &research_data, &progress)
                    .await;

                let summary = self
                    .context_manager
                    .compress_section_to_summary(&section)
                    .await;
                section.summary = summary;

                self.emit(PipelineEvent::Section {
                    description: format!(
                        "Completed {progress}: {} ({} words, {} citations)",
                        section.spec.title,
                        section.word_count,
                        section.citations_used.len()
                    ),
                });
                self.sections.push(section);
            }
        }

        // 3. Conclusion.
        let conclusion = self
            .section_generator
            .generate_conclusion(&structure, &self.sections, query)
            .await;
        self.emit(PipelineEvent::Section {
            description: format!("Conclusion generated ({} words)", conclusion.word_count),
        });
        self.sections.push(conclusion);

        // 4. Assembly and terminal event.
        self.emit(PipelineEvent::Section {
            description: "Assembling final report...".to_string(),
        });
        let report = self
            .assembler
            .assemble_final_report(&structure, &self.sections);

        self.intermediate_log
            .push("Structured report generation complete.".to_string());
        self.emit(PipelineEvent::Final {
            report,
            citations: self.citations.clone(),
        });
    }

    /// Generate one section, regenerating once if validation fails.
    async fn generate_section_with_validation(
        &mut self,
        spec: &SectionSpec,
        research_data: &str,
        progress: &str,
    ) -> GeneratedSection {
        let mut regeneration_guidance = String::new();
        let mut attempt = 1;

        loop {
            let context = self
                .context_manager
                .build_generation_context(&self.sections, research_data)
                .await;

            if attempt > 1 {
                self.emit(PipelineEvent::Section {
                    description: format!(
                        "{progress}: Regenerating (attempt {attempt}/{MAX_SECTION_ATTEMPTS})..."
                    ),
                });
            }

            let section = self
                .section_generator
                .generate_section(spec, &context, research_data, &regeneration_guidance)
                .await;

            let validation = self.validator.validate_section(&section, &self.sections);
            let (should_regen, guidance) =
                self.validator
                    .should_regenerate(&validation, attempt, MAX_SECTION_ATTEMPTS);

            if !should_regen {
                if !validation.is_valid {
                    self.emit(PipelineEvent::Section {
                        description: format!(
                            "⚠️ {progress}: Quality issues detected but proceeding (max attempts reached)"
                        ),
                    });
                }
                return section;
            }

            regeneration_guidance = guidance;
            attempt += 1;
        }
    }

    /// Research findings formatted for section generation prompts.
    fn prepare_research_data(&self) -> String {
        self.history
            .iter()
            .filter_map(|entry| {
                let (query, answer) = (entry.query.as_ref()?, entry.answer.as_ref()?);
                Some(format!("**Research Query:** {query}\n**Findings:** {answer}\n"))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Q&A history rendered with configurable separators.
    fn qa_history_text(&self, entry_sep: &str, q_prefix: &str, a_prefix: &str) -> String {
        self.history
            .iter()
            .filter_map(|entry| {
                let (query, answer) = (entry.query.as_ref()?, entry.answer.as_ref()?);
                Some(format!("{q_prefix}{query}{a_prefix}{answer}"))
            })
            .collect::<Vec<_>>()
            .join(entry_sep)
    }
}

/// First 200 characters of a text, for streamed previews.
fn preview(text: &str) -> &str {
    crate::chunker::truncate_chars(text, 200)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct VecSink {
        updates: Mutex<Vec<ProgressUpdate>>,
    }

    impl UpdateSink for VecSink {
        fn send(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }
    }

    fn test_pipeline(sink: Box<dyn UpdateSink>) -> ResearchPipeline {
        let client = Arc::new(
            GeminiClient::new(crate::client::GeminiConfig {
                api_key: "test-key".to_string(),
                ..crate::client::GeminiConfig::default()
            })
            .unwrap(),
        );
        ResearchPipeline::new(client, PipelineConfig::default(), sink)
    }

    #[test]
    fn test_emit_accumulates_log_and_sends_one_update() {
        let sink = Arc::new(VecSink::default());
        let mut pipeline = test_pipeline(Box::new(SharedSink(Arc::clone(&sink))));

        pipeline.emit(PipelineEvent::Plan {
            description: "step one".to_string(),
        });
        pipeline.emit(PipelineEvent::Iteration {
            description: "step two".to_string(),
            citations: Some(vec!["https://example.com".to_string()]),
        });

        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].intermediate_steps.as_deref(), Some("step one"));
        assert_eq!(
            updates[1].intermediate_steps.as_deref(),
            Some("step one|||---|||step two")
        );
        assert!(updates[1].citations.is_some());
        assert!(updates.iter().all(|u| !u.complete));
    }

    #[test]
    fn test_final_event_is_terminal_shape() {
        let sink = Arc::new(VecSink::default());
        let mut pipeline = test_pipeline(Box::new(SharedSink(Arc::clone(&sink))));

        pipeline.emit(PipelineEvent::Final {
            report: "# Report".to_string(),
            citations: vec!["https://example.com".to_string()],
        });

        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].complete);
        assert!(!updates[0].is_intermediate);
        assert_eq!(updates[0].final_report.as_deref(), Some("# Report"));
        assert_eq!(updates[0].citations.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_recover_retrieval_failure_records_qa_history() {
        let mut pipeline = test_pipeline(Box::new(crate::events::LogSink));
        let answer = pipeline.recover_retrieval_failure("test query", "400 Bad Request");

        assert!(answer.starts_with("Unable to retrieve web information for this query:"));
        assert_eq!(pipeline.history.len(), 1);
        let entry = &pipeline.history[0];
        assert_eq!(entry.query.as_deref(), Some("test query"));
        // Every history entry with a query carries a non-empty answer.
        assert!(!entry.answer.as_deref().unwrap().is_empty());
        assert!(pipeline.citations.is_empty());
    }

    #[test]
    fn test_qa_history_rendering_skips_notes() {
        let mut pipeline = test_pipeline(Box::new(crate::events::LogSink));
        pipeline.history.push(HistoryEntry::note("narrative".to_string()));
        pipeline.history.push(HistoryEntry {
            description: "qa".to_string(),
            query: Some("q1".to_string()),
            answer: Some("a1".to_string()),
        });

        let rendered = pipeline.qa_history_text("\n", "Q: ", "\nA: ");
        assert_eq!(rendered, "Q: q1\nA: a1");

        let research_data = pipeline.prepare_research_data();
        assert_eq!(research_data, "**Research Query:** q1\n**Findings:** a1\n");
    }

    /// Wrapper so tests can keep a handle on the sink after boxing it.
    #[derive(Debug)]
    struct SharedSink(Arc<VecSink>);

    impl UpdateSink for SharedSink {
        fn send(&self, update: ProgressUpdate) {
            self.0.send(update);
        }
    }
}
