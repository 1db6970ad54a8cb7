use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // flat envelope, matching what the browser client parses
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<chatgate_config::StoreError> for ApiError {
    fn from(error: chatgate_config::StoreError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<chatgate_proxy::ProxyError> for ApiError {
    fn from(error: chatgate_proxy::ProxyError) -> Self {
        match error {
            chatgate_proxy::ProxyError::Timeout => ApiError::Timeout,
            chatgate_proxy::ProxyError::Network(message) => ApiError::Upstream(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
