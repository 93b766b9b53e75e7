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

//! Tool Dispatcher
//!
//! Runs one invocation end to end:
//!
//! ```text
//! lookup -> validate -> rate limit -> execute (time-boxed) -> record -> envelope
//! ```
//!
//! Failures before the handler runs are returned as `Err(ToolError)`. Once the
//! handler has been invoked the outcome is always `Ok`, with handler errors and
//! timeouts folded into an error [`ToolResult`] and counted in the metrics.

use super::metrics::MetricsStore;
use super::rate_limiter::{RateDecision, SlidingWindowLimiter};
use super::registry::ToolRegistry;
use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use toolbridge_core::{
    generate_request_id, CallerContext, ExecutionContext, ToolError, ToolResult,
};

/// Result of a dispatched call that reached the handler.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub request_id: String,
    pub result: ToolResult,
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    metrics: Arc<MetricsStore>,
    limiter: SlidingWindowLimiter,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, metrics: Arc<MetricsStore>) -> Self {
        Self {
            registry,
            metrics,
            limiter: SlidingWindowLimiter::new(),
        }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        params: Option<Value>,
        caller: CallerContext,
    ) -> Result<DispatchOutcome, ToolError> {
        let tool = self
            .registry
            .lookup(tool_name)
            .ok_or_else(|| ToolError::ToolNotFound {
                name: tool_name.to_string(),
                available: self.registry.names(),
            })?;

        let raw = match params {
            Some(Value::Null) | None => json!({}),
            Some(v) => v,
        };
        let params = match tool.schema.validate(&raw) {
            Ok(p) => p,
            Err(issues) => {
                self.metrics.record_rejection(&tool.name);
                tracing::debug!(
                    "Validation failed for tool '{}': {} issue(s)",
                    tool.name,
                    issues.len()
                );
                return Err(ToolError::ValidationFailed { issues });
            }
        };

        if let RateDecision::Limited { retry_after } =
            self.limiter
                .check_and_record(&tool.name, tool.rate_limit.as_ref(), &caller.client_id)
        {
            tracing::warn!(
                "Rate limit exceeded for tool '{}' by client '{}'",
                tool.name,
                caller.client_id
            );
            return Err(ToolError::RateLimitExceeded {
                tool: tool.name.clone(),
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        let ctx = ExecutionContext {
            request_id: caller.request_id.unwrap_or_else(generate_request_id),
            timestamp: Utc::now(),
            user_id: caller.user_id,
            session_id: caller.session_id,
        };

        let timeout = tool.timeout.unwrap_or_else(|| self.registry.default_timeout());
        let start = Instant::now();
        let call = AssertUnwindSafe(tool.handler.call(params, &ctx)).catch_unwind();
        let outcome = tokio::time::timeout(timeout, call).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(Ok(result))) => result.normalize(),
            Ok(Err(panic)) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    "Tool '{}' panicked: {}",
                    tool.name,
                    panic_message(panic.as_ref())
                );
                ToolResult::from_error(&ToolError::internal("tool handler panicked"))
            }
            Ok(Ok(Err(err))) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    "Tool '{}' failed: {}",
                    tool.name,
                    err
                );
                ToolResult::from_error(&err)
            }
            Err(_) => {
                let err = ToolError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                };
                tracing::warn!(
                    request_id = %ctx.request_id,
                    "Tool '{}' timed out after {}ms",
                    tool.name,
                    timeout.as_millis()
                );
                ToolResult::from_error(&err)
            }
        };

        let snapshot = self
            .metrics
            .record_call(&tool.name, execution_time_ms, result.is_error);
        let timestamp = Utc::now();

        let result = result
            .with_extra("tool", json!(tool.name))
            .with_extra("executionTimeMs", json!(execution_time_ms))
            .with_extra(
                "timestamp",
                json!(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            )
            .with_extra("requestId", json!(ctx.request_id))
            .with_extra(
                "averageExecutionTimeMs",
                json!(snapshot.average_execution_time_ms()),
            );

        tracing::debug!(
            request_id = %ctx.request_id,
            "Tool '{}' completed in {}ms (error: {})",
            tool.name,
            execution_time_ms,
            result.is_error
        );

        Ok(DispatchOutcome {
            request_id: ctx.request_id,
            result,
        })
    }

    /// Drop rate windows that no longer hold any timestamps.
    pub fn purge_idle_windows(&self) {
        let registry = self.registry.clone();
        self.limiter.purge_idle(|tool| {
            registry
                .lookup(tool)
                .and_then(|t| t.rate_limit.map(|p| p.window()))
        });
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolbridge_core::{handler_fn, Field, RateLimitPolicy, Schema, ToolDefinition};

    fn echo_tool() -> ToolDefinition {
        ToolDefinition::new(
            "echo",
            "Echo text back",
            "Utility",
            Schema::object(vec![Field::required("text", Schema::string())]),
            handler_fn(|params: Value, _ctx: ExecutionContext| async move {
                let text = params["text"].as_str().unwrap_or_default().to_string();
                Ok(ToolResult::text(format!("Echo: {text}")))
            }),
        )
    }

    fn setup() -> (ToolDispatcher, Arc<MetricsStore>) {
        let metrics = Arc::new(MetricsStore::new());
        let registry = Arc::new(ToolRegistry::new(metrics.clone(), Duration::from_secs(5)));
        registry.register(echo_tool()).unwrap();
        (ToolDispatcher::new(registry, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_successful_call_records_metrics() {
        let (dispatcher, metrics) = setup();
        let caller = CallerContext {
            request_id: Some("req-fixed".into()),
            ..CallerContext::default()
        };
        let outcome = dispatcher
            .execute("echo", Some(json!({ "text": "hi" })), caller)
            .await
            .unwrap();

        assert!(!outcome.result.is_error);
        assert_eq!(outcome.result.content[0].text.as_deref(), Some("Echo: hi"));
        assert_eq!(outcome.request_id, "req-fixed");

        let extra = &outcome.result.metadata.as_ref().unwrap().extra;
        assert_eq!(extra["tool"], "echo");
        assert_eq!(extra["requestId"], "req-fixed");
        assert!(extra.contains_key("averageExecutionTimeMs"));

        let m = metrics.snapshot("echo").unwrap();
        assert_eq!((m.calls, m.errors), (1, 0));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let (dispatcher, _) = setup();
        let err = dispatcher
            .execute("nope", None, CallerContext::default())
            .await
            .unwrap_err();
        match err {
            ToolError::ToolNotFound { available, .. } => assert_eq!(available, vec!["echo"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_a_call() {
        let (dispatcher, metrics) = setup();
        let err = dispatcher
            .execute("echo", None, CallerContext::default())
            .await
            .unwrap_err();
        match err {
            ToolError::ValidationFailed { issues } => assert_eq!(issues[0].path, "text"),
            other => panic!("unexpected {other:?}"),
        }
        let m = metrics.snapshot("echo").unwrap();
        assert_eq!((m.calls, m.errors, m.rejected), (0, 0, 1));
    }

    #[tokio::test]
    async fn test_invalid_params_do_not_consume_rate_slots() {
        let metrics = Arc::new(MetricsStore::new());
        let registry = Arc::new(ToolRegistry::new(metrics.clone(), Duration::from_secs(5)));
        registry
            .register(echo_tool().with_rate_limit(RateLimitPolicy::per_minute(1)))
            .unwrap();
        let dispatcher = ToolDispatcher::new(registry, metrics);

        for _ in 0..3 {
            let err = dispatcher
                .execute("echo", Some(json!({})), CallerContext::new("c1"))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "VALIDATION_FAILED");
        }
        assert!(dispatcher
            .execute("echo", Some(json!({ "text": "a" })), CallerContext::new("c1"))
            .await
            .is_ok());
        let err = dispatcher
            .execute("echo", Some(json!({ "text": "b" })), CallerContext::new("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_handler_error_counts_as_error() {
        let (dispatcher, metrics) = setup();
        dispatcher
            .registry
            .register(ToolDefinition::new(
                "broken",
                "Always fails",
                "Test",
                Schema::object(vec![]),
                handler_fn(|_: Value, _: ExecutionContext| async {
                    Err(ToolError::execution_failed("boom"))
                }),
            ))
            .unwrap();

        let outcome = dispatcher
            .execute("broken", None, CallerContext::default())
            .await
            .unwrap();
        assert!(outcome.result.is_error);
        assert_eq!(outcome.result.content[0].text.as_deref(), Some("boom"));

        let m = metrics.snapshot("broken").unwrap();
        assert_eq!((m.calls, m.errors), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout() {
        let (dispatcher, metrics) = setup();
        dispatcher
            .registry
            .register(
                ToolDefinition::new(
                    "sleepy",
                    "Never finishes in time",
                    "Test",
                    Schema::object(vec![]),
                    handler_fn(|_: Value, _: ExecutionContext| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(ToolResult::text("late"))
                    }),
                )
                .with_timeout(Duration::from_millis(100)),
            )
            .unwrap();

        let outcome = dispatcher
            .execute("sleepy", None, CallerContext::default())
            .await
            .unwrap();
        assert!(outcome.result.is_error);
        let block = &outcome.result.content[0];
        assert_eq!(block.metadata.as_ref().unwrap()["code"], "TIMEOUT");
        let m = metrics.snapshot("sleepy").unwrap();
        assert_eq!((m.calls, m.errors), (1, 1));
        assert!(m.last_used.is_some());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_recorded() {
        let (dispatcher, metrics) = setup();
        dispatcher
            .registry
            .register(ToolDefinition::new(
                "buggy",
                "Panics",
                "Test",
                Schema::object(vec![]),
                handler_fn(|_: Value, _: ExecutionContext| async {
                    if true {
                        panic!("handler bug");
                    }
                    Ok(ToolResult::text("unreachable"))
                }),
            ))
            .unwrap();

        let outcome = dispatcher
            .execute("buggy", None, CallerContext::default())
            .await
            .unwrap();
        assert!(outcome.result.is_error);
        let block = &outcome.result.content[0];
        assert_eq!(block.metadata.as_ref().unwrap()["code"], "INTERNAL_ERROR");
        assert!(!block.text.as_deref().unwrap().contains("handler bug"));

        let m = metrics.snapshot("buggy").unwrap();
        assert_eq!((m.calls, m.errors), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_are_monotonic_across_outcomes() {
        let (dispatcher, metrics) = setup();
        let registry = &dispatcher.registry;
        registry
            .register(ToolDefinition::new(
                "mixed",
                "Succeeds, fails, stalls or panics on request",
                "Test",
                Schema::object(vec![Field::required(
                    "mode",
                    Schema::enumeration(["ok", "fail", "stall", "panic"]),
                )]),
                handler_fn(|params: Value, _: ExecutionContext| async move {
                    match params["mode"].as_str() {
                        Some("fail") => Err(ToolError::execution_failed("nope")),
                        Some("stall") => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            Ok(ToolResult::text("late"))
                        }
                        Some("panic") => panic!("mixed handler panicked"),
                        _ => Ok(ToolResult::text("fine")),
                    }
                }),
            )
            .with_timeout(Duration::from_millis(100)))
            .unwrap();

        let modes = ["ok", "fail", "stall", "bogus", "panic", "ok", "stall", "fail"];
        let mut previous = metrics.snapshot("mixed").unwrap();
        for mode in modes {
            let outcome = dispatcher
                .execute("mixed", Some(json!({ "mode": mode })), CallerContext::default())
                .await;

            let m = metrics.snapshot("mixed").unwrap();
            assert!(m.calls >= previous.calls, "calls decreased after {mode}");
            assert!(m.errors >= previous.errors, "errors decreased after {mode}");
            assert!(m.total_execution_time_ms >= previous.total_execution_time_ms);
            assert!(m.errors <= m.calls);

            match mode {
                "bogus" => {
                    assert!(outcome.is_err());
                    assert_eq!(m.calls, previous.calls);
                    assert_eq!(m.rejected, previous.rejected + 1);
                }
                "ok" => {
                    assert!(!outcome.unwrap().result.is_error);
                    assert_eq!((m.calls, m.errors), (previous.calls + 1, previous.errors));
                }
                _ => {
                    assert!(outcome.unwrap().result.is_error);
                    assert_eq!(
                        (m.calls, m.errors),
                        (previous.calls + 1, previous.errors + 1)
                    );
                }
            }
            previous = m;
        }
        assert_eq!((previous.calls, previous.errors), (7, 5));
    }
}
