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

//! Streaming Broadcaster
//!
//! Every stream connection gets the tool catalog, then a status event, then a
//! metrics event followed by a keepalive on each interval tick. The interval
//! lives inside the connection's stream, so dropping the stream (client gone,
//! write failed) stops it with nothing left to clean up.

use crate::process::{MemoryStats, ProcessMonitor};
use crate::tool_registry::{MetricsStore, MetricsSummary, ToolFilter, ToolMetricsView, ToolRegistry};
use chrono::{SecondsFormat, Utc};
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::{RateLimitPolicy, ToolDefinition};

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Catalog entry for one tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: String,
    pub permissions: Vec<String>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub input_schema: Value,
}

impl From<&ToolDefinition> for ToolDescriptor {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            category: tool.category.clone(),
            permissions: tool.permissions.clone(),
            rate_limit: tool.rate_limit,
            input_schema: tool.schema.to_json_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SseEvent {
    Tools {
        tools: Vec<ToolDescriptor>,
        timestamp: String,
    },
    Status {
        status: String,
        #[serde(rename = "toolsCount")]
        tools_count: usize,
        uptime: u64,
        version: String,
        memory: MemoryStats,
        timestamp: String,
    },
    Metrics {
        metrics: Vec<ToolMetricsView>,
        summary: MetricsSummary,
        uptime: u64,
        timestamp: String,
    },
    Error {
        message: String,
        timestamp: String,
    },
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Serialized [`SseEvent`].
    Event(String),
    KeepAlive,
}

#[derive(Clone)]
pub struct StreamBroadcaster {
    registry: Arc<ToolRegistry>,
    metrics: Arc<MetricsStore>,
    process: Arc<ProcessMonitor>,
    interval: Duration,
    active: Arc<AtomicUsize>,
    ticks: Arc<AtomicU64>,
}

impl StreamBroadcaster {
    pub fn new(
        registry: Arc<ToolRegistry>,
        metrics: Arc<MetricsStore>,
        process: Arc<ProcessMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            process,
            interval,
            active: Arc::new(AtomicUsize::new(0)),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Total interval firings across all connections.
    pub fn interval_firings(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Open a connection stream. It runs until dropped.
    pub fn open(&self, client_id: String) -> impl Stream<Item = StreamFrame> + Send + 'static {
        let this = self.clone();
        let guard = ConnectionGuard::new(self.active.clone(), client_id);

        async_stream::stream! {
            let _guard = guard;
            yield this.frame(&this.tools_event());
            yield this.frame(&this.status_event());

            let start = tokio::time::Instant::now() + this.interval;
            let mut ticker = tokio::time::interval_at(start, this.interval);
            loop {
                ticker.tick().await;
                this.ticks.fetch_add(1, Ordering::SeqCst);
                yield this.frame(&this.metrics_event());
                yield StreamFrame::KeepAlive;
            }
        }
    }

    pub fn tools_event(&self) -> SseEvent {
        SseEvent::Tools {
            tools: self
                .registry
                .list(&ToolFilter::default())
                .iter()
                .map(|t| ToolDescriptor::from(t.as_ref()))
                .collect(),
            timestamp: now_iso(),
        }
    }

    pub fn status_event(&self) -> SseEvent {
        SseEvent::Status {
            status: "connected".to_string(),
            tools_count: self.registry.len(),
            uptime: self.process.uptime_secs(),
            version: SERVER_VERSION.to_string(),
            memory: self.process.snapshot().memory,
            timestamp: now_iso(),
        }
    }

    pub fn metrics_event(&self) -> SseEvent {
        SseEvent::Metrics {
            metrics: self.metrics.views(),
            summary: self.metrics.summary(),
            uptime: self.process.uptime_secs(),
            timestamp: now_iso(),
        }
    }

    fn frame(&self, event: &SseEvent) -> StreamFrame {
        match serde_json::to_string(event) {
            Ok(json) => StreamFrame::Event(json),
            Err(err) => {
                tracing::error!("Failed to serialize stream event: {}", err);
                let fallback = SseEvent::Error {
                    message: "Failed to serialize event".to_string(),
                    timestamp: now_iso(),
                };
                StreamFrame::Event(
                    serde_json::to_string(&fallback)
                        .unwrap_or_else(|_| r#"{"type":"error"}"#.to_string()),
                )
            }
        }
    }
}

struct ConnectionGuard {
    active: Arc<AtomicUsize>,
    client_id: String,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>, client_id: String) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Stream client '{}' connected ({} active)", client_id, now);
        Self { active, client_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let left = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::info!(
            "Stream client '{}' disconnected ({} active)",
            self.client_id,
            left
        );
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
