//! In-memory provider fakes for stage and pipeline tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use postcheck_providers::{CompletionRequest, LanguageModel, SearchProvider};
use postcheck_shared::{
    AnalysisRequest, Credentials, PipelineConfig, PostcheckError, Result, SearchHit,
};

type SearchFn = Box<dyn Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync>;
type CompleteFn = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

/// Search fake driven by a closure over the query text.
pub(crate) struct FakeSearch {
    respond: SearchFn,
    latency: Duration,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub(crate) fn new(
        respond: impl Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every query returns `n` hits derived from the query text.
    pub(crate) fn with_hits(n: usize) -> Self {
        Self::new(move |query| Ok(hits_for(query, n)))
    }

    /// Every query fails the way a bad subscription token does.
    pub(crate) fn unauthorized() -> Self {
        Self::new(|_| {
            Err(PostcheckError::Upstream {
                service: "fake-search",
                status: 401,
                message: "invalid token".into(),
            })
        })
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, _api_key: &str, query: &str, _count: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(query)
    }

    fn name(&self) -> &'static str {
        "fake-search"
    }
}

pub(crate) fn hits_for(query: &str, n: usize) -> Vec<SearchHit> {
    (1..=n)
        .map(|i| SearchHit {
            title: format!("{query} result {i}"),
            url: format!("https://example.com/{i}"),
            description: format!("Finding {i} about {query}"),
        })
        .collect()
}

/// Model fake driven by a closure over the request; records every call.
pub(crate) struct FakeModel {
    respond: CompleteFn,
    latency: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeModel {
    pub(crate) fn new(
        respond: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fails with an upstream error.
    pub(crate) fn failing() -> Self {
        Self::new(|_| {
            Err(PostcheckError::Upstream {
                service: "fake-llm",
                status: 500,
                message: "boom".into(),
            })
        })
    }

    /// Answers planner calls with `queries` and rewrites by tagging the text it was given.
    pub(crate) fn cooperative(queries: &[&str]) -> Self {
        let json = serde_json::to_string(queries).unwrap();
        Self::new(move |req| {
            if is_planner(req) {
                Ok(format!("```json\n{json}\n```"))
            } else {
                Ok(format!("```html\n{}\n```", tag_rewrite(rewrite_target(req))))
            }
        })
    }

    /// Every call takes `latency` before answering.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, _api_key: &str, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(request)
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

pub(crate) fn is_planner(req: &CompletionRequest) -> bool {
    req.system
        .as_deref()
        .is_some_and(|s| s == crate::planner::PLANNER_SYSTEM)
}

/// The content a rewrite request asked to be rewritten.
pub(crate) fn rewrite_target(req: &CompletionRequest) -> &str {
    req.prompt
        .rsplit_once(crate::rewrite::CONTENT_MARKER)
        .map(|(_, content)| content)
        .unwrap_or("")
}

pub(crate) fn tag_rewrite(text: &str) -> String {
    format!("<!-- checked -->{}", text.trim())
}

pub(crate) fn request(content: &str, title: &str) -> AnalysisRequest {
    AnalysisRequest::new(
        content,
        title,
        Credentials {
            search_key: "search-key".into(),
            llm_key: "llm-key".into(),
        },
        None,
        None,
    )
    .unwrap()
}

/// Defaults with the inline delays removed.
pub(crate) fn config() -> PipelineConfig {
    PipelineConfig {
        search_delay: Duration::ZERO,
        chunk_delay: Duration::ZERO,
        ..PipelineConfig::default()
    }
}

/// Roughly `target` bytes of HTML with an `<h2>` every `section` bytes.
pub(crate) fn long_post(target: usize, section: usize) -> String {
    let mut out = String::from("<p>Intro paragraph about Webflow plans.</p>\n");
    let mut i = 0;
    while out.len() < target {
        out.push_str(&format!("<h2>Section {i}</h2>\n<p>"));
        let body_len = section.saturating_sub(30);
        out.push_str(&"Pricing starts at $14 per month. ".repeat(body_len / 33 + 1));
        out.push_str("</p>\n");
        i += 1;
    }
    out
}
