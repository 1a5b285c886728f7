//! HTTP surface: health, the analyze endpoint and the CMS proxy.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use postcheck_core::{Analyzer, SilentProgress};
use postcheck_providers::{CmsClient, CmsResponse};
use postcheck_shared::{AnalysisRequest, Credentials, PostcheckError};

/// Largest accepted request body.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub analyzer: Analyzer,
    pub cms: CmsClient,
}

pub(crate) fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/cms/collections/:collection_id/items", get(cms_list))
        .route(
            "/api/cms/collections/:collection_id/items/:item_id",
            get(cms_get).patch(cms_update),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Analyze
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    #[serde(default)]
    blog_content: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    anthropic_key: String,
    #[serde(default)]
    brave_key: String,
    #[serde(default)]
    research_prompt: Option<String>,
    #[serde(default)]
    writing_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    content: String,
    changes: Vec<String>,
    searches_used: usize,
    /// Rewrite-stage model calls.
    claude_calls: usize,
    /// All model calls, planner included.
    llm_calls: usize,
    sections_updated: usize,
    /// Milliseconds.
    duration: u64,
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("invalid request body: {rejection}"),
            );
        }
    };

    let credentials = Credentials {
        search_key: body.brave_key,
        llm_key: body.anthropic_key,
    };
    let request = match AnalysisRequest::new(
        body.blog_content,
        body.title,
        credentials,
        body.research_prompt,
        body.writing_prompt,
    ) {
        Ok(request) => request,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.analyzer.run(&request, &SilentProgress).await {
        Ok(result) => {
            info!(
                searches_used = result.searches_used,
                llm_calls = result.llm_calls,
                duration_ms = result.duration.as_millis() as u64,
                "analyze request served"
            );
            Json(AnalyzeResponse {
                content: result.rewritten_content,
                changes: result.change_summary,
                searches_used: result.searches_used,
                claude_calls: result.rewrite_calls,
                llm_calls: result.llm_calls,
                sections_updated: result.sections_updated,
                duration: result.duration.as_millis() as u64,
            })
            .into_response()
        }
        Err(e) if e.is_validation() => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            let duration = e.elapsed.as_millis() as u64;
            error!(error = %e.source, duration_ms = duration, "analysis failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "duration": duration })),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// CMS proxy
// ---------------------------------------------------------------------------

/// The caller's bearer token, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn missing_token() -> Response {
    error_body(StatusCode::UNAUTHORIZED, "missing bearer token")
}

/// Relay the upstream status and body, or 502 if the CMS could not be reached.
fn relay(result: Result<CmsResponse, PostcheckError>) -> Response {
    match result {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            if response.body.is_null() {
                status.into_response()
            } else {
                (status, Json(response.body)).into_response()
            }
        }
        Err(e) => {
            warn!(error = %e, "CMS request failed");
            error_body(StatusCode::BAD_GATEWAY, format!("CMS unavailable: {e}"))
        }
    }
}

async fn cms_list(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return missing_token();
    };
    relay(state.cms.list_items(token, &collection_id, &query).await)
}

async fn cms_get(
    State(state): State<AppState>,
    Path((collection_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return missing_token();
    };
    relay(state.cms.get_item(token, &collection_id, &item_id).await)
}

async fn cms_update(
    State(state): State<AppState>,
    Path((collection_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return missing_token();
    };
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("invalid request body: {rejection}"),
            );
        }
    };
    relay(state.cms.update_item(token, &collection_id, &item_id, &body).await)
}
