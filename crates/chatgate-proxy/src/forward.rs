use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Method, StatusCode};

use crate::rewrite::{ensure_image_modalities, ModelCapability};

/// Upper bound on time-to-response-headers for a forwarded request. The body
/// stream itself is unbounded; long SSE completions outlive this limit.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(600);

pub const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";
const ACCEL_BUFFERING_HEADER: &str = "x-accel-buffering";

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream network error: {0}")]
    Network(String),
}

/// One inbound request, reduced to what the upstream call needs. Built once;
/// the only mutation is the documented image-generation body rewrite, applied
/// at send time.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Provider-relative path, leading slash included.
    pub path: String,
    pub body: Option<Bytes>,
    /// Preserve the `alt=sse` marker the streaming client sets.
    pub alt_sse: bool,
    pub capability: ModelCapability,
}

pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

/// Resolve the API key for a forwarded request: provider header first, then
/// a bearer token, then the server-configured fallback.
pub fn resolve_api_key(headers: &HeaderMap, fallback: Option<&str>) -> Option<String> {
    let inbound = headers
        .get(GOOGLE_API_KEY_HEADER)
        .or_else(|| headers.get(AUTHORIZATION))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().replace("Bearer ", "").trim().to_string())
        .filter(|value| !value.is_empty());

    inbound.or_else(|| fallback.map(|key| key.to_string()))
}

/// Default the scheme to https and strip the trailing slash.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

pub fn upstream_url(base_url: &str, path: &str, alt_sse: bool) -> String {
    let base = normalize_base_url(base_url);
    let mut url = if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };
    if alt_sse {
        url.push_str("?alt=sse");
    }
    url
}

/// Forward a request to the upstream provider and hand back the streamed
/// response.
///
/// The relayed headers are the upstream's minus `www-authenticate` (a browser
/// seeing it would pop a credential prompt) plus `x-accel-buffering: no` so
/// intermediaries do not buffer the stream. Status and body bytes pass
/// through untouched.
pub async fn forward(
    client: &Client,
    base_url: &str,
    request: ForwardRequest,
    api_key: &str,
) -> Result<ForwardResponse, ProxyError> {
    let url = upstream_url(base_url, &request.path, request.alt_sse);
    tracing::debug!(method = %request.method, %url, "forwarding request upstream");

    let body = request.body.map(|body| match request.capability {
        ModelCapability::ImageGeneration => ensure_image_modalities(&body),
        ModelCapability::Standard => body,
    });

    let mut builder = client
        .request(request.method, &url)
        .header(CONTENT_TYPE, "application/json")
        .header(CACHE_CONTROL, "no-store")
        .header(GOOGLE_API_KEY_HEADER, api_key);
    if let Some(body) = body {
        builder = builder.body(body);
    }

    let response = tokio::time::timeout(FORWARD_TIMEOUT, builder.send())
        .await
        .map_err(|_| ProxyError::Timeout)?
        .map_err(|e| ProxyError::Network(e.to_string()))?;

    let status = response.status();
    let mut headers = response.headers().clone();
    headers.remove(WWW_AUTHENTICATE);
    headers.insert(
        HeaderName::from_static(ACCEL_BUFFERING_HEADER),
        HeaderValue::from_static("no"),
    );

    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| ProxyError::Network(e.to_string())));

    Ok(ForwardResponse {
        status,
        headers,
        body: Box::pin(stream),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_scheme_and_loses_trailing_slash() {
        assert_eq!(
            normalize_base_url("generativelanguage.googleapis.com/"),
            "https://generativelanguage.googleapis.com"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8080"),
            "http://localhost:8080"
        );
    }

    #[test]
    fn upstream_url_preserves_sse_marker() {
        assert_eq!(
            upstream_url("example.com", "/v1beta/models/x:streamGenerateContent", true),
            "https://example.com/v1beta/models/x:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            upstream_url("example.com/", "v1beta/models", false),
            "https://example.com/v1beta/models"
        );
    }

    #[test]
    fn api_key_prefers_provider_header() {
        let mut headers = HeaderMap::new();
        headers.insert(GOOGLE_API_KEY_HEADER, "goog-key".parse().unwrap());
        headers.insert(AUTHORIZATION, "Bearer bearer-key".parse().unwrap());
        assert_eq!(
            resolve_api_key(&headers, Some("fallback")),
            Some("goog-key".to_string())
        );
    }

    #[test]
    fn api_key_strips_bearer_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer sk-123".parse().unwrap());
        assert_eq!(resolve_api_key(&headers, None), Some("sk-123".to_string()));
    }

    #[test]
    fn api_key_falls_back_to_server_key() {
        let headers = HeaderMap::new();
        assert_eq!(
            resolve_api_key(&headers, Some("server-key")),
            Some("server-key".to_string())
        );
        assert_eq!(resolve_api_key(&headers, None), None);
    }

    #[test]
    fn empty_bearer_token_does_not_mask_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(
            resolve_api_key(&headers, Some("server-key")),
            Some("server-key".to_string())
        );
    }
}
