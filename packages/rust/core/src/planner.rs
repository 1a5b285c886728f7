//! Search query planning.
//!
//! Asks the model for a short JSON list of fact-checking queries. Anything that goes
//! wrong (call failure, prose instead of JSON, an empty list) falls back to a fixed
//! set of queries built from the title, so this stage never fails.

use chrono::Datelike;
use tracing::{info, instrument};

use postcheck_content::{extract_json_array, strip_code_fences, truncate};
use postcheck_providers::{CompletionRequest, LanguageModel};
use postcheck_shared::{AnalysisRequest, PipelineConfig, PostcheckError, Result};

use crate::fallback::primary_or_else;

pub(crate) const PLANNER_SYSTEM: &str = "You are a research planner for a blog fact-checking \
    workflow. You reply with a JSON array of strings and nothing else.";

/// Used when the caller gives no research guidance.
const DEFAULT_RESEARCH_FOCUS: &str = "Verify current pricing, plan limits, feature \
    availability, platform policies, and any statistics or dates the post states.";

/// Stand-in subject when the post has no title.
const UNTITLED_SUBJECT: &str = "blog post";

/// Queries chosen for one request.
#[derive(Debug, Clone)]
pub struct PlannedQueries {
    /// Ordered by priority; never empty.
    pub queries: Vec<String>,
    /// Model calls counted for this stage (1 on the primary path, 0 on fallback).
    pub llm_calls: usize,
    pub used_fallback: bool,
}

/// Plan the searches for `request`.
#[instrument(skip_all, fields(title = %request.title))]
pub async fn generate_queries(
    llm: &dyn LanguageModel,
    request: &AnalysisRequest,
    config: &PipelineConfig,
) -> PlannedQueries {
    let completion = CompletionRequest {
        system: Some(PLANNER_SYSTEM.to_string()),
        prompt: planner_prompt(request, config),
        max_tokens: config.planner_max_tokens,
    };

    let primary = async {
        let raw = llm.complete(&request.credentials.llm_key, &completion).await?;
        parse_queries(&raw, config.max_queries)
    };
    let year = chrono::Utc::now().year();
    let resolved = primary_or_else("query planning", primary, || {
        let mut queries = fallback_queries(&request.title, year);
        queries.truncate(config.max_queries.max(1));
        queries
    })
    .await;

    let used_fallback = resolved.is_fallback();
    info!(
        queries = resolved.value.len(),
        used_fallback, "search queries planned"
    );

    PlannedQueries {
        queries: resolved.value,
        llm_calls: if used_fallback { 0 } else { 1 },
        used_fallback,
    }
}

fn planner_prompt(request: &AnalysisRequest, config: &PipelineConfig) -> String {
    let focus = request
        .research_instructions
        .as_deref()
        .unwrap_or(DEFAULT_RESEARCH_FOCUS);
    let sample = truncate(&request.content, config.planner_sample);
    let max = config.max_queries;
    let min = max.min(5);

    format!(
        "Title: {title}\n\n\
         Research focus: {focus}\n\n\
         Post excerpt:\n{sample}\n\n\
         Write {min} to {max} web search queries that would confirm or correct the factual \
         claims in this post. Keep each query under ten words and put the most important \
         checks first. Respond with a JSON array of strings only, for example \
         [\"query one\", \"query two\"].",
        title = request.title.trim(),
    )
}

/// Parse the model's reply into at most `max` distinct, non-blank queries.
pub fn parse_queries(raw: &str, max: usize) -> Result<Vec<String>> {
    let cleaned = strip_code_fences(raw);
    let parsed: Vec<String> = match serde_json::from_str(&cleaned) {
        Ok(list) => list,
        Err(first) => extract_json_array(&cleaned)
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| {
                PostcheckError::parse(format!("planner reply is not a JSON string array: {first}"))
            })?,
    };

    let mut queries: Vec<String> = Vec::with_capacity(parsed.len());
    for query in parsed {
        let query = query.trim();
        if query.is_empty() || queries.iter().any(|q| q.eq_ignore_ascii_case(query)) {
            continue;
        }
        queries.push(query.to_string());
    }
    queries.truncate(max);

    if queries.is_empty() {
        return Err(PostcheckError::parse("planner returned no usable queries"));
    }
    Ok(queries)
}

/// Deterministic queries used when planning fails.
pub fn fallback_queries(title: &str, year: i32) -> Vec<String> {
    let subject = match title.trim() {
        "" => UNTITLED_SUBJECT,
        t => t,
    };
    vec![
        format!("{subject} pricing {year}"),
        format!("{subject} features comparison"),
        format!("{subject} latest updates {year}"),
        format!("{subject} plan limits and usage policies"),
    ]
}
