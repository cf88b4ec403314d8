//! HTTP response types and utilities
//!
//! Client-facing routes answer failures with a bare 404 carrying an
//! `X-Tuner-Error` header naming the failure domain, which is what DVR clients
//! tolerate. The admin API uses the JSON [`ApiResponse`] wrapper.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SessionError;

/// Diagnostic header on every 404
pub const TUNER_ERROR_HEADER: &str = "x-tuner-error";

pub const M3U_CONTENT_TYPE: &str = "audio/x-mpegurl";
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Seconds a client should wait before retrying a transient failure
const RETRY_AFTER_SECS: &str = "2";

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        };
        (status, Json(self)).into_response()
    }
}

/// 404 with a diagnostic code
pub fn not_found(code: &'static str, message: impl Into<String>) -> Response {
    let mut response = (StatusCode::NOT_FOUND, message.into()).into_response();
    response
        .headers_mut()
        .insert(TUNER_ERROR_HEADER, HeaderValue::from_static(code));
    response
}

/// 404 for a request-path failure; transient ones also carry `Retry-After`
pub fn session_error(err: &SessionError) -> Response {
    debug!("Channel {} request failed: {}", err.channel(), err);
    let mut response = not_found(err.code(), err.to_string());
    if err.is_retryable() {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
    }
    response
}

/// Text body with a content type and no caching
pub fn text(content_type: &'static str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

pub fn binary(content_type: &'static str, body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}
