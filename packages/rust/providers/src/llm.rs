//! Language model seam and the Anthropic Messages implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use postcheck_shared::{LlmConfig, PostcheckError, Result};

/// One single-turn completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Optional system instructions.
    pub system: Option<String>,
    /// The user message.
    pub prompt: String,
    /// Output token budget.
    pub max_tokens: u32,
}

/// A text-completion backend. The caller's key is passed per call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion and return the concatenated text output.
    async fn complete(&self, api_key: &str, request: &CompletionRequest) -> Result<String>;

    /// Model identifier for logs.
    fn model(&self) -> &str;
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    endpoint: Url,
    client: Client,
    model: String,
    api_version: String,
}

impl AnthropicClient {
    /// Create a client from the `[llm]` config section.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            endpoint: crate::parse_endpoint(&config.endpoint)?,
            client: crate::build_client(Duration::from_secs(config.timeout_secs))?,
            model: config.model.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    #[instrument(skip_all, fields(model = %self.model, max_tokens = request.max_tokens))]
    async fn complete(&self, api_key: &str, request: &CompletionRequest) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::transport_error("anthropic", e))?;

        if !response.status().is_success() {
            return Err(crate::upstream_error("anthropic", response).await);
        }

        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PostcheckError::parse(format!("anthropic: invalid response body: {e}")))?;

        if data.stop_reason.as_deref() == Some("max_tokens") {
            warn!("completion stopped at the token limit, output may be cut short");
        }
        if let Some(usage) = &data.usage {
            debug!(
                tokens_in = usage.input_tokens,
                tokens_out = usage.output_tokens,
                "completion finished"
            );
        }

        Ok(data.text())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl MessagesResponse {
    /// Concatenated text blocks; tool-use and other block types are ignored.
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
