//! Sequential, rate-limited web research.
//!
//! Queries run one at a time with a fixed pause between them. A failed search is
//! logged and skipped; only a run where every search failed is fatal.

use std::fmt::Write as _;

use tracing::{info, instrument, warn};

use postcheck_providers::SearchProvider;
use postcheck_shared::{Deadline, PipelineConfig, PostcheckError, Result, SearchHit};

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Findings and digest
// ---------------------------------------------------------------------------

/// Hits returned for one query, already cut to the configured top N.
#[derive(Debug, Clone)]
pub struct SearchFinding {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// All findings flattened into one block of text for the rewrite prompt.
///
/// Opaque to the rest of the pipeline: it is appended to, and read whole.
#[derive(Debug, Clone, Default)]
pub struct ResearchDigest(String);

impl ResearchDigest {
    /// Append a labeled section for `finding`.
    pub fn push(&mut self, finding: &SearchFinding) {
        if !self.0.is_empty() {
            self.0.push('\n');
        }
        let _ = writeln!(self.0, "### Search: {}", finding.query);
        if finding.hits.is_empty() {
            self.0.push_str("(no results)\n");
            return;
        }
        for (i, hit) in finding.hits.iter().enumerate() {
            let _ = writeln!(self.0, "{}. {}", i + 1, hit.title);
            let _ = writeln!(self.0, "   URL: {}", hit.url);
            if !hit.description.is_empty() {
                let _ = writeln!(self.0, "   {}", hit.description);
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Research stage
// ---------------------------------------------------------------------------

/// What the research stage produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub digest: ResearchDigest,
    pub findings: Vec<SearchFinding>,
    /// Searches that got a non-error response.
    pub searches_used: usize,
    /// Searches that returned at least one hit.
    pub successful_searches: usize,
    /// Searches actually issued (skipped ones excluded).
    pub attempted: usize,
    /// The deadline cut the query list short.
    pub stopped_early: bool,
}

/// Run `queries` in order against `search`.
///
/// Fails with `Timeout` if the deadline has passed before the first search, and
/// with `ResearchUnavailable` if every issued search failed.
#[instrument(skip_all, fields(provider = search.name(), queries = queries.len()))]
pub async fn research(
    search: &dyn SearchProvider,
    search_key: &str,
    queries: &[String],
    deadline: &Deadline,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<ResearchOutcome> {
    let mut outcome = ResearchOutcome {
        digest: ResearchDigest::default(),
        findings: Vec::new(),
        searches_used: 0,
        successful_searches: 0,
        attempted: 0,
        stopped_early: false,
    };

    for (i, query) in queries.iter().enumerate() {
        if i > 0 && !config.search_delay.is_zero() {
            tokio::time::sleep(config.search_delay).await;
        }
        if deadline.is_expired() {
            warn!(
                remaining_queries = queries.len() - i,
                elapsed_ms = deadline.elapsed().as_millis() as u64,
                "time budget exhausted, skipping remaining searches"
            );
            outcome.stopped_early = true;
            break;
        }

        outcome.attempted += 1;
        match search
            .search(search_key, query, config.results_per_query)
            .await
        {
            Ok(mut hits) => {
                hits.truncate(config.results_per_query);
                outcome.searches_used += 1;
                if !hits.is_empty() {
                    outcome.successful_searches += 1;
                }
                let finding = SearchFinding {
                    query: query.clone(),
                    hits,
                };
                outcome.digest.push(&finding);
                outcome.findings.push(finding);
            }
            Err(e) => {
                warn!(query = %query, error = %e, "search failed, skipping");
            }
        }
        progress.search_finished(query, i + 1, queries.len());
    }

    if outcome.attempted == 0 && outcome.stopped_early {
        return Err(PostcheckError::Timeout { stage: "research" });
    }
    if outcome.searches_used == 0 {
        return Err(PostcheckError::ResearchUnavailable {
            attempted: outcome.attempted,
        });
    }

    info!(
        searches_used = outcome.searches_used,
        successful = outcome.successful_searches,
        digest_len = outcome.digest.len(),
        stopped_early = outcome.stopped_early,
        "research complete"
    );

    Ok(outcome)
}
