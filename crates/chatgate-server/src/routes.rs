use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use chatgate_catalog::CategoryRules;
use chatgate_probe::{CancellationToken, ProbeRunner};
use chatgate_proxy::{capability_for_path, forward, resolve_api_key, ForwardRequest};
use chatgate_types::{ModelDescriptor, ModelTestRequest, ModelTestResponse};

use crate::error::{ApiError, Result};
use crate::server::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router())
}

fn api_router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/google/{*path}", any(forward_google))
        .route("/proxy", post(proxy_fetch))
        .route("/model-test", post(model_test))
        .route("/models", get(list_models).put(replace_models))
        .route("/categories", get(list_categories))
        .route("/categories/reset", post(reset_categories))
        .route("/categories/{name}", put(set_category))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Relay a provider request to the configured Gemini upstream, streaming the
/// response back. The key comes from the caller's headers or the server
/// fallback; without either the request is rejected before anything leaves
/// the gateway.
async fn forward_google(
    State(state): State<Arc<ServerState>>,
    method: Method,
    Path(rest): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    if method == Method::OPTIONS {
        return Ok(Json(json!({ "body": "OK" })).into_response());
    }

    let api_key = resolve_api_key(&headers, state.config.google_api_key.as_deref())
        .ok_or_else(|| ApiError::Unauthorized("missing GOOGLE_API_KEY".to_string()))?;

    let path = format!("/{rest}");
    let alt_sse = query
        .as_deref()
        .map(|q| q.split('&').any(|pair| pair == "alt=sse"))
        .unwrap_or(false);

    let request = ForwardRequest {
        method,
        capability: capability_for_path(&path),
        path,
        body: (!body.is_empty()).then_some(body),
        alt_sse,
    };

    let upstream = forward(
        &state.client,
        &state.config.google_base_url,
        request,
        &api_key,
    )
    .await?;

    let mut response = Response::new(Body::from_stream(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    Ok(response)
}

/// Server-keyed GET passthrough, so the browser can list provider resources
/// without ever seeing the key. The upstream JSON is returned verbatim.
async fn proxy_fetch(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<Value>,
) -> Result<Json<Value>> {
    let url = request["url"]
        .as_str()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing url".to_string()))?;

    let api_key = state
        .config
        .openai_api_key
        .as_deref()
        .ok_or_else(|| ApiError::Internal("server API key not configured".to_string()))?;

    let response = state
        .client
        .get(url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let data = response
        .json::<Value>()
        .await
        .map_err(|e| ApiError::Upstream(format!("malformed upstream response: {e}")))?;

    Ok(Json(data))
}

/// Probe each requested model sequentially against the OpenAI-compatible
/// upstream and report per-model outcomes. Results also fold into the
/// catalog's availability annotations.
async fn model_test(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ModelTestRequest>,
) -> Result<Json<ModelTestResponse>> {
    if request.models.is_empty() {
        return Err(ApiError::BadRequest("no models to test".to_string()));
    }

    let api_key = state
        .config
        .openai_api_key
        .clone()
        .ok_or_else(|| ApiError::Internal("server API key not configured".to_string()))?;

    let timeout = request
        .timeout_seconds
        .filter(|secs| *secs > 0)
        .unwrap_or(state.config.probe_timeout_secs);

    tracing::info!(count = request.models.len(), timeout_secs = timeout, "starting model test run");

    let runner = ProbeRunner::new(
        state.config.openai_base_url.clone(),
        api_key,
        Duration::from_secs(timeout),
    );
    let token = CancellationToken::new();
    let results = runner.run(&request.models, &token, |_, _, _| {}).await;

    state.catalog.record_results(&results).await?;

    Ok(Json(ModelTestResponse { results }))
}

async fn list_models(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<ModelDescriptor>>> {
    Ok(Json(state.catalog.models().await?))
}

async fn replace_models(
    State(state): State<Arc<ServerState>>,
    Json(models): Json<Vec<ModelDescriptor>>,
) -> Result<StatusCode> {
    state.catalog.replace_models(models).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_categories(State(state): State<Arc<ServerState>>) -> Result<Json<CategoryRules>> {
    Ok(Json(state.catalog.category_rules().await?))
}

#[derive(Debug, Deserialize)]
struct SetCategoryRequest {
    pattern: String,
}

async fn set_category(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(request): Json<SetCategoryRequest>,
) -> Result<Json<CategoryRules>> {
    if request.pattern.trim().is_empty() {
        return Err(ApiError::BadRequest("pattern must not be empty".to_string()));
    }
    Ok(Json(
        state.catalog.set_category(name, request.pattern).await?,
    ))
}

async fn reset_categories(State(state): State<Arc<ServerState>>) -> Result<Json<CategoryRules>> {
    Ok(Json(state.catalog.reset_categories().await?))
}
