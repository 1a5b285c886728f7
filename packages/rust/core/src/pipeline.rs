//! End-to-end analysis pipeline: plan → research → rewrite → summary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use postcheck_providers::{LanguageModel, SearchProvider};
use postcheck_shared::{
    AnalysisRequest, AnalysisResult, Deadline, PipelineConfig, PostcheckError, RequestId,
};

use crate::planner::{self, PlannedQueries};
use crate::research::{self, ResearchOutcome};
use crate::rewrite::{self, RewriteInput, RewriteOutcome};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each search, successful or not.
    fn search_finished(&self, query: &str, current: usize, total: usize);
    /// Called after each section of a chunked rewrite.
    fn chunk_rewritten(&self, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &AnalysisResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn search_finished(&self, _query: &str, _current: usize, _total: usize) {}
    fn chunk_rewritten(&self, _current: usize, _total: usize) {}
    fn done(&self, _result: &AnalysisResult) {}
}

/// A fatal pipeline failure and how long the run took before it.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct PipelineError {
    pub source: PostcheckError,
    pub elapsed: Duration,
}

impl PipelineError {
    fn new(source: PostcheckError, deadline: &Deadline) -> Self {
        Self {
            source,
            elapsed: deadline.elapsed(),
        }
    }

    /// The caller sent an unusable request rather than the pipeline failing.
    pub fn is_validation(&self) -> bool {
        self.source.is_validation()
    }
}

/// Runs analyses against shared provider clients.
///
/// Cheap to clone; every run owns its own deadline and counters.
#[derive(Clone)]
pub struct Analyzer {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LanguageModel>,
    config: PipelineConfig,
}

impl Analyzer {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Self {
        Self { search, llm, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fact-check and rewrite one post.
    ///
    /// 1. Plan search queries (falls back to templated queries)
    /// 2. Research them one by one until the budget runs out
    /// 3. Rewrite in one pass or section by section
    /// 4. Summarize what changed
    #[instrument(
        skip_all,
        fields(request_id = %RequestId::new(), content_len = request.content.len())
    )]
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalysisResult, PipelineError> {
        let deadline = Deadline::after(self.config.budget);
        request
            .validate()
            .map_err(|e| PipelineError::new(e, &deadline))?;

        info!(
            title = %request.title,
            budget_secs = self.config.budget.as_secs(),
            "starting analysis"
        );

        // --- Phase 1: Query planning ---
        progress.phase("Planning search queries");
        let planned = planner::generate_queries(self.llm.as_ref(), request, &self.config).await;
        if deadline.is_expired() {
            return Err(PipelineError::new(
                PostcheckError::Timeout {
                    stage: "query planning",
                },
                &deadline,
            ));
        }

        // --- Phase 2: Research ---
        progress.phase("Researching claims");
        let research = research::research(
            self.search.as_ref(),
            &request.credentials.search_key,
            &planned.queries,
            &deadline,
            &self.config,
            progress,
        )
        .await
        .map_err(|e| PipelineError::new(e, &deadline))?;

        // --- Phase 3: Rewrite ---
        progress.phase("Rewriting content");
        let input = RewriteInput {
            content: &request.content,
            title: &request.title,
            digest: &research.digest,
            writing_instructions: request.writing_instructions.as_deref(),
        };
        let rewritten = rewrite::rewrite(
            self.llm.as_ref(),
            &request.credentials.llm_key,
            &input,
            &deadline,
            &self.config,
            progress,
        )
        .await
        .map_err(|e| PipelineError::new(e, &deadline))?;

        // --- Phase 4: Summary ---
        let change_summary = summarize(&planned, &research, &rewritten);
        let result = AnalysisResult {
            change_summary,
            searches_used: research.searches_used,
            llm_calls: planned.llm_calls + rewritten.llm_calls,
            rewrite_calls: rewritten.llm_calls,
            sections_updated: rewritten.sections_updated,
            rewritten_content: rewritten.content,
            duration: deadline.elapsed(),
        };

        if deadline.is_expired() {
            warn!(elapsed_ms = result.duration.as_millis() as u64, "analysis ran past its budget");
        }
        info!(
            searches_used = result.searches_used,
            llm_calls = result.llm_calls,
            sections_updated = result.sections_updated,
            elapsed_ms = result.duration.as_millis() as u64,
            "analysis complete"
        );

        progress.done(&result);
        Ok(result)
    }
}

fn summarize(
    planned: &PlannedQueries,
    research: &ResearchOutcome,
    rewritten: &RewriteOutcome,
) -> Vec<String> {
    let llm_calls = planned.llm_calls + rewritten.llm_calls;
    let mut notes = vec![format!(
        "Ran {} of {} planned web searches ({} with results)",
        research.searches_used,
        planned.queries.len(),
        research.successful_searches
    )];
    if planned.used_fallback {
        notes.push("Used templated search queries after query planning failed".to_string());
    }
    notes.push(format!("Made {llm_calls} language model calls"));

    if rewritten.chunked {
        notes.push(format!(
            "Rewrote {} of {} sections",
            rewritten.sections_updated, rewritten.sections_total
        ));
    } else if rewritten.sections_updated == 1 {
        notes.push("Rewrote the full post in a single pass".to_string());
    }

    if rewritten.sections_updated > 0 {
        notes.extend(
            [
                "Updated facts, prices and figures from current research",
                "Preserved links, images, tables and embeds",
                "Normalized punctuation and tightened style",
            ]
            .map(String::from),
        );
    }

    if rewritten.sections_kept > 0 {
        notes.push(format!(
            "Kept original text for {} section(s) after failed rewrites",
            rewritten.sections_kept
        ));
    }
    if research.stopped_early {
        notes.push(format!(
            "Research stopped early after {} of {} searches to stay within the time budget",
            research.attempted,
            planned.queries.len()
        ));
    }
    if rewritten.sections_skipped > 0 {
        notes.push(format!(
            "Left {} section(s) unchanged because the time budget ran out",
            rewritten.sections_skipped
        ));
    }
    notes
}
