//! Core domain types for a single analysis request.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PostcheckError, Result};

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper used to correlate the log lines of one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Caller-supplied upstream keys. Forwarded as-is, never stored.
#[derive(Clone)]
pub struct Credentials {
    /// Web search subscription token.
    pub search_key: String,
    /// Language model API key.
    pub llm_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("search_key", &"<redacted>")
            .field("llm_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AnalysisRequest
// ---------------------------------------------------------------------------

/// Everything needed to fact-check and rewrite one post.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Post body (usually CMS rich-text HTML).
    pub content: String,
    /// Post title.
    pub title: String,
    /// Upstream keys.
    pub credentials: Credentials,
    /// Extra guidance for query planning.
    pub research_instructions: Option<String>,
    /// Extra guidance for the rewrite.
    pub writing_instructions: Option<String>,
}

impl AnalysisRequest {
    /// Build a request, rejecting it if content or either key is blank.
    pub fn new(
        content: impl Into<String>,
        title: impl Into<String>,
        credentials: Credentials,
        research_instructions: Option<String>,
        writing_instructions: Option<String>,
    ) -> Result<Self> {
        let request = Self {
            content: content.into(),
            title: title.into(),
            credentials,
            research_instructions: research_instructions.filter(|s| !s.trim().is_empty()),
            writing_instructions: writing_instructions.filter(|s| !s.trim().is_empty()),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the request invariants.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.content.trim().is_empty() {
            missing.push("content");
        }
        if self.credentials.llm_key.trim().is_empty() {
            missing.push("llm key");
        }
        if self.credentials.search_key.trim().is_empty() {
            missing.push("search key");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PostcheckError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// One web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// Final output of a successful analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    /// The rewritten post body.
    pub rewritten_content: String,
    /// Human-readable notes on what the pipeline did.
    pub change_summary: Vec<String>,
    /// Search requests that got a non-error response.
    pub searches_used: usize,
    /// Language model calls attempted, planner included.
    pub llm_calls: usize,
    /// Language model calls made by the rewrite stage alone.
    pub rewrite_calls: usize,
    /// Sections whose rewrite was applied.
    pub sections_updated: usize,
    /// Total wall-clock time.
    #[serde(serialize_with = "duration_millis")]
    pub duration: Duration,
}

fn duration_millis<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Absolute expiry for one pipeline run, polled before each external call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    expires_at: Instant,
}

impl Deadline {
    /// Start the clock now with the given budget.
    pub fn after(budget: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            expires_at: started_at + budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}
