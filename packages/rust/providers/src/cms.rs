//! Pass-through client for CMS collection items.
//!
//! The caller's bearer token is forwarded untouched and the upstream status and
//! body are relayed as-is; only transport failures become errors.

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use postcheck_shared::{CmsConfig, PostcheckError, Result};

/// Upstream status plus body, relayed verbatim to the caller.
#[derive(Debug, Clone)]
pub struct CmsResponse {
    pub status: u16,
    /// Parsed JSON, or a JSON string when the body was not JSON.
    pub body: Value,
}

/// Thin client over the CMS collection-items API.
#[derive(Clone)]
pub struct CmsClient {
    base: Url,
    client: Client,
}

impl CmsClient {
    /// Create a client from the `[cms]` config section.
    pub fn new(config: &CmsConfig) -> Result<Self> {
        Ok(Self {
            base: crate::parse_endpoint(&config.endpoint)?,
            client: crate::build_client(Duration::from_secs(config.timeout_secs))?,
        })
    }

    /// `GET /collections/{collection_id}/items` with the caller's query string.
    #[instrument(skip(self, token, query))]
    pub async fn list_items(
        &self,
        token: &str,
        collection_id: &str,
        query: &[(String, String)],
    ) -> Result<CmsResponse> {
        let url = self.items_url(collection_id, None)?;
        let request = self
            .client
            .request(Method::GET, url)
            .bearer_auth(token)
            .query(query);
        self.relay(request).await
    }

    /// `GET /collections/{collection_id}/items/{item_id}`.
    #[instrument(skip(self, token))]
    pub async fn get_item(
        &self,
        token: &str,
        collection_id: &str,
        item_id: &str,
    ) -> Result<CmsResponse> {
        let url = self.items_url(collection_id, Some(item_id))?;
        let request = self.client.request(Method::GET, url).bearer_auth(token);
        self.relay(request).await
    }

    /// `PATCH /collections/{collection_id}/items/{item_id}` with a JSON body.
    #[instrument(skip(self, token, body))]
    pub async fn update_item(
        &self,
        token: &str,
        collection_id: &str,
        item_id: &str,
        body: &Value,
    ) -> Result<CmsResponse> {
        let url = self.items_url(collection_id, Some(item_id))?;
        let request = self
            .client
            .request(Method::PATCH, url)
            .bearer_auth(token)
            .json(body);
        self.relay(request).await
    }

    fn items_url(&self, collection_id: &str, item_id: Option<&str>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                PostcheckError::config(format!("CMS endpoint cannot be a base: {}", self.base))
            })?;
            segments
                .pop_if_empty()
                .extend(["collections", collection_id, "items"]);
            if let Some(item_id) = item_id {
                segments.push(item_id);
            }
        }
        Ok(url)
    }

    async fn relay(&self, request: reqwest::RequestBuilder) -> Result<CmsResponse> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| crate::transport_error("cms", e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| PostcheckError::Network(format!("cms: failed to read body: {e}")))?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!(status, "cms response relayed");
        Ok(CmsResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CmsClient {
        CmsClient::new(&CmsConfig {
            endpoint: format!("{}/v2/", server.uri()),
            ..CmsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn item_urls_escape_ids() {
        let client = CmsClient::new(&CmsConfig {
            endpoint: "https://cms.example.com/v2".into(),
            ..CmsConfig::default()
        })
        .unwrap();

        let url = client.items_url("col 1", Some("item/2")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cms.example.com/v2/collections/col%201/items/item%2F2"
        );
        let list = client.items_url("abc", None).unwrap();
        assert_eq!(list.as_str(), "https://cms.example.com/v2/collections/abc/items");
    }

    #[tokio::test]
    async fn forwards_bearer_token_and_relays_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/collections/posts/items/42"))
            .and(header("Authorization", "Bearer cms-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "42",
                "fieldData": {"name": "Hello"}
            })))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .get_item("cms-token", "posts", "42")
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["fieldData"]["name"], "Hello");
    }

    #[tokio::test]
    async fn list_forwards_query_string() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/collections/posts/items"))
            .and(query_param("limit", "10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let query = vec![("limit".to_string(), "10".to_string())];
        let response = client_for(&server)
            .list_items("t", "posts", &query)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn patch_sends_body_and_relays_error_status() {
        let server = MockServer::start().await;
        let update = serde_json::json!({"fieldData": {"post-body": "<p>new</p>"}});

        Mock::given(method("PATCH"))
            .and(path("/v2/collections/posts/items/42"))
            .and(body_json(&update))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .update_item("t", "posts", "42", &update)
            .await
            .unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(response.body, Value::String("conflict".into()));
    }
}
