//! HTTP clients for the upstream services postcheck orchestrates.
//!
//! The pipeline only sees the [`SearchProvider`] and [`LanguageModel`] traits, so
//! tests and alternative vendors can slot in without touching the stages.
//! [`CmsClient`] is a thin pass-through used by the proxy endpoints.

mod cms;
mod llm;
mod search;

use std::time::Duration;

use postcheck_content::truncate;
use postcheck_shared::{PostcheckError, Result};
use reqwest::Client;
use url::Url;

pub use cms::{CmsClient, CmsResponse};
pub use llm::{AnthropicClient, CompletionRequest, LanguageModel};
pub use search::{BraveSearch, SearchProvider};

/// User-Agent string for upstream requests.
const USER_AGENT: &str = concat!("postcheck/", env!("CARGO_PKG_VERSION"));

/// Upstream error bodies are cut to this many bytes before logging.
const MAX_ERROR_BODY: usize = 300;

/// Build a reqwest client with the shared settings and a per-call timeout.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| PostcheckError::Network(format!("failed to build HTTP client: {e}")))
}

/// Parse a configured endpoint, reporting bad values as config errors.
fn parse_endpoint(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| PostcheckError::config(format!("invalid endpoint '{raw}': {e}")))
}

/// Map a transport failure to a network error, calling out timeouts.
fn transport_error(service: &str, err: reqwest::Error) -> PostcheckError {
    if err.is_timeout() {
        PostcheckError::Network(format!("{service}: request timed out"))
    } else {
        PostcheckError::Network(format!("{service}: {err}"))
    }
}

/// Read a failed response into an `Upstream` error.
async fn upstream_error(service: &'static str, response: reqwest::Response) -> PostcheckError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PostcheckError::Upstream {
        service,
        status,
        message: truncate(&body, MAX_ERROR_BODY).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn rejects_invalid_endpoint() {
        let err = parse_endpoint("not a url").unwrap_err();
        assert!(err.to_string().contains("invalid endpoint"));
        assert!(parse_endpoint("https://api.example.com/v1").is_ok());
    }

    #[tokio::test]
    async fn upstream_error_cuts_long_multibyte_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("\u{e9}".repeat(400)))
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let response = client.get(server.uri()).send().await.unwrap();
        let err = upstream_error("test", response).await;

        match err {
            PostcheckError::Upstream {
                service,
                status,
                message,
            } => {
                assert_eq!(service, "test");
                assert_eq!(status, 500);
                assert_eq!(message, "\u{e9}".repeat(MAX_ERROR_BODY / 2));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
