// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod execute;
pub mod health;
pub mod metrics;
pub mod stream;
pub mod tools;

pub use execute::execute_tool;
pub use health::health_check;
pub use metrics::get_metrics;
pub use stream::sse_stream;
pub use tools::list_tools;

use crate::broadcaster::StreamBroadcaster;
use crate::process::ProcessMonitor;
use crate::tool_registry::{MetricsStore, ToolDispatcher, ToolRegistry};
use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use toolbridge_core::{generate_request_id, ToolError, ValidationIssue};

/// Routes advertised by the 404 fallback.
pub const AVAILABLE_ENDPOINTS: &[&str] = &["/health", "/tools", "/execute", "/sse", "/metrics"];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub metrics: Arc<MetricsStore>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub broadcaster: StreamBroadcaster,
    pub process: Arc<ProcessMonitor>,
    pub memory_threshold_bytes: u64,
}

impl AppState {
    pub fn new(
        registry: Arc<ToolRegistry>,
        process: Arc<ProcessMonitor>,
        metrics_interval: Duration,
        memory_threshold_bytes: u64,
    ) -> Self {
        let metrics = registry.metrics().clone();
        let dispatcher = Arc::new(ToolDispatcher::new(registry.clone(), metrics.clone()));
        let broadcaster = StreamBroadcaster::new(
            registry.clone(),
            metrics.clone(),
            process.clone(),
            metrics_interval,
        );
        Self {
            registry,
            metrics,
            dispatcher,
            broadcaster,
            process,
            memory_threshold_bytes,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Parameter validation failed")]
    Validation(Vec<ValidationIssue>),

    #[error("{message}")]
    ToolNotFound {
        message: String,
        available: Vec<String>,
    },

    #[error("Request body exceeds {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("{message}")]
    RateLimited { message: String, retry_after_ms: u64 },

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    is_error: bool,
    request_id: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ToolNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error envelope under a known request id.
    pub fn into_response_with(self, request_id: String) -> Response {
        let status = self.status();
        let mut body = ErrorResponse {
            error: self.to_string(),
            is_error: true,
            request_id,
            timestamp: now_iso(),
            details: None,
            available_tools: None,
            retry_after_ms: None,
        };
        match self {
            ApiError::Validation(issues) => body.details = Some(issues),
            ApiError::ToolNotFound { available, .. } => body.available_tools = Some(available),
            ApiError::RateLimited { retry_after_ms, .. } => {
                body.retry_after_ms = Some(retry_after_ms)
            }
            ApiError::Internal(detail) => {
                tracing::error!(request_id = %body.request_id, "Internal error: {}", detail);
            }
            ApiError::BadRequest(_) | ApiError::PayloadTooLarge { .. } => {}
        }
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_with(generate_request_id())
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::ValidationFailed { issues } => ApiError::Validation(issues),
            ToolError::ToolNotFound { ref available, .. } => ApiError::ToolNotFound {
                available: available.clone(),
                message: err.to_string(),
            },
            ToolError::RateLimitExceeded { retry_after_ms, .. } => ApiError::RateLimited {
                message: err.to_string(),
                retry_after_ms,
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotFoundResponse {
    error: String,
    is_error: bool,
    path: String,
    available_endpoints: &'static [&'static str],
    timestamp: String,
}

/// Fallback for unmatched routes
pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Endpoint not found".to_string(),
            is_error: true,
            path: uri.path().to_string(),
            available_endpoints: AVAILABLE_ENDPOINTS,
            timestamp: now_iso(),
        }),
    )
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let err: ApiError = ToolError::ValidationFailed {
            issues: vec![ValidationIssue {
                path: "text".into(),
                message: "Required".into(),
                code: "required".into(),
            }],
        }
        .into();
        let response = err.into_response_with("req-1".into());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["isError"], true);
        assert_eq!(body["requestId"], "req-1");
        assert_eq!(body["details"][0]["path"], "text");
        assert!(body.get("availableTools").is_none());
    }

    #[tokio::test]
    async fn test_internal_errors_are_opaque() {
        let err: ApiError = ToolError::internal("db exploded").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_rate_limit_envelope() {
        let err: ApiError = ToolError::RateLimitExceeded {
            tool: "echo".into(),
            retry_after_ms: 1500,
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["retryAfterMs"], 1500);
    }
}
