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

//! Tool Definition
//!
//! The contract between the runtime and a tool: what it is called, how its
//! input is described, how it is invoked, and what it returns.

use crate::error::{Result, ToolError};
use crate::schema::Schema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Definition
// ============================================================================

/// Sliding-window quota applied per (tool, client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window_ms: window.as_millis() as u64,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// A registered tool. Immutable once handed to the registry.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: String,
    pub schema: Schema,
    pub handler: Arc<dyn ToolHandler>,
    /// Advisory tags such as `filesystem:read`. Not enforced.
    pub permissions: Vec<String>,
    pub rate_limit: Option<RateLimitPolicy>,
    /// Upper bound on handler execution. `None` means the registry default.
    pub timeout: Option<Duration>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        schema: Schema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            schema,
            handler,
            permissions: Vec::new(),
            rate_limit: None,
            timeout: None,
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("permissions", &self.permissions)
            .field("rate_limit", &self.rate_limit)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Handler contract
// ============================================================================

/// Executes a tool against already-validated parameters.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    async fn call(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        (self.f)(params, ctx.clone()).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

// ============================================================================
// Contexts
// ============================================================================

/// Per-invocation context handed to the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: Utc::now(),
            user_id: None,
            session_id: None,
        }
    }
}

/// Who is calling, as seen by the transport.
#[derive(Debug, Clone)]
pub struct CallerContext {
    /// Key for per-tool rate limits.
    pub client_id: String,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl CallerContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            request_id: None,
            user_id: None,
            session_id: None,
        }
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

pub fn generate_request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            text: Some(text.into()),
            data: None,
            mime_type: None,
            metadata: None,
        }
    }

    pub fn json(data: Value) -> Self {
        Self {
            kind: ContentKind::Json,
            text: None,
            data: Some(data),
            mime_type: Some("application/json".into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
            metadata: None,
        }
    }

    pub fn json(data: Value) -> Self {
        Self {
            content: vec![ContentBlock::json(data)],
            is_error: false,
            metadata: None,
        }
    }

    /// Failed result carrying a message and a machine code in block metadata.
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        Self {
            content: vec![ContentBlock::text(message).with_metadata("code", Value::from(code))],
            is_error: true,
            metadata: None,
        }
    }

    pub fn from_error(err: &ToolError) -> Self {
        Self::error(err.to_string(), err.code())
    }

    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.content.push(block);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(ResultMetadata::default)
            .extra
            .insert(key.into(), value);
        self
    }

    /// Enforce the shape every caller can rely on: at least one block, and a
    /// readable text block whenever `is_error` is set.
    pub fn normalize(mut self) -> Self {
        if self.is_error && !self.content.iter().any(ContentBlock::has_text) {
            self.content.insert(
                0,
                ContentBlock::text("Tool execution failed")
                    .with_metadata("code", Value::from("EXECUTION_FAILED")),
            );
        }
        if self.content.is_empty() {
            self.content.push(ContentBlock::text("Tool returned no content"));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_serialization_shape() {
        let result = ToolResult::text("Echo: hi");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({ "content": [{ "type": "text", "text": "Echo: hi" }], "isError": false })
        );
    }

    #[test]
    fn test_error_result_has_code() {
        let err = ToolError::PathDenied {
            path: "/etc/passwd".into(),
        };
        let result = ToolResult::from_error(&err);
        assert!(result.is_error);
        let block = &result.content[0];
        assert_eq!(block.text.as_deref(), Some("Path access denied: /etc/passwd"));
        assert_eq!(block.metadata.as_ref().unwrap()["code"], "PATH_DENIED");
    }

    #[test]
    fn test_normalize_fills_missing_text() {
        let empty = ToolResult {
            content: vec![],
            is_error: false,
            metadata: None,
        }
        .normalize();
        assert_eq!(empty.content.len(), 1);

        let silent_error = ToolResult {
            content: vec![ContentBlock::json(json!({ "exitCode": 1 }))],
            is_error: true,
            metadata: None,
        }
        .normalize();
        assert_eq!(silent_error.content.len(), 2);
        assert_eq!(
            silent_error.content[0].text.as_deref(),
            Some("Tool execution failed")
        );
    }

    #[test]
    fn test_metadata_extras_flatten() {
        let result = ToolResult::text("ok").with_extra("tool", json!("echo"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["metadata"], json!({ "tool": "echo" }));
    }

    #[test]
    fn test_rate_limit_policy_window() {
        let policy = RateLimitPolicy::per_minute(10);
        assert_eq!(policy.window(), Duration::from_secs(60));
        assert_eq!(
            serde_json::to_value(policy).unwrap(),
            json!({ "maxRequests": 10, "windowMs": 60000 })
        );
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = handler_fn(|params: Value, ctx: ExecutionContext| async move {
            let text = params["text"].as_str().unwrap_or_default().to_string();
            Ok(ToolResult::text(format!("{}:{}", ctx.request_id, text)))
        });
        let ctx = ExecutionContext::new("req-1");
        let result = handler.call(json!({ "text": "hi" }), &ctx).await.unwrap();
        assert_eq!(result.content[0].text.as_deref(), Some("req-1:hi"));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(a.starts_with("req-"));
        assert_ne!(a, b);
    }
}
