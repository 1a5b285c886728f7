//! Web search provider seam and the Brave Search implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use postcheck_shared::{PostcheckError, Result, SearchHit};

/// Brave caps `count` at 20.
const MAX_COUNT: usize = 20;

/// A web search backend. The caller's key is passed per call.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query and return up to `count` hits in ranking order.
    async fn search(&self, api_key: &str, query: &str, count: usize) -> Result<Vec<SearchHit>>;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

/// Brave Search web endpoint client.
pub struct BraveSearch {
    endpoint: Url,
    client: Client,
}

impl BraveSearch {
    /// Create a client for `endpoint` with the given per-call timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: crate::parse_endpoint(endpoint)?,
            client: crate::build_client(timeout)?,
        })
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    #[instrument(skip(self, api_key), fields(provider = "brave"))]
    async fn search(&self, api_key: &str, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let count = count.clamp(1, MAX_COUNT).to_string();
        let response = self
            .client
            .get(self.endpoint.clone())
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| crate::transport_error("brave", e))?;

        if !response.status().is_success() {
            return Err(crate::upstream_error("brave", response).await);
        }

        let data: BraveResponse = response
            .json()
            .await
            .map_err(|e| PostcheckError::parse(format!("brave: invalid response body: {e}")))?;

        let hits: Vec<SearchHit> = data
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                description: r.description,
            })
            .collect();

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "brave"
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWebResults>,
}

#[derive(Debug, serde::Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, serde::Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}
