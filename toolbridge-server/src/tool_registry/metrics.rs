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

//! Per-tool call metrics
//!
//! Each tool owns one [`ToolMetrics`] entry. Updates happen under the DashMap
//! entry guard, so a call's counters move together.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetrics {
    pub calls: u64,
    pub total_execution_time_ms: u64,
    /// Calls whose result was an error. Never exceeds `calls`.
    pub errors: u64,
    /// Requests refused by input validation. Not counted in `calls`.
    pub rejected: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ToolMetrics {
    pub fn average_execution_time_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_execution_time_ms as f64 / self.calls as f64
        }
    }

    pub fn error_rate_percent(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64 * 100.0
        }
    }
}

/// Wire form of one tool's metrics, as published by `/metrics` and the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetricsView {
    pub name: String,
    pub calls: u64,
    pub errors: u64,
    pub rejected: u64,
    pub total_execution_time_ms: u64,
    pub average_execution_time_ms: f64,
    pub error_rate_percent: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ToolMetricsView {
    pub fn new(name: impl Into<String>, m: &ToolMetrics) -> Self {
        Self {
            name: name.into(),
            calls: m.calls,
            errors: m.errors,
            rejected: m.rejected,
            total_execution_time_ms: m.total_execution_time_ms,
            average_execution_time_ms: m.average_execution_time_ms(),
            error_rate_percent: m.error_rate_percent(),
            last_used: m.last_used,
        }
    }
}

/// Totals across every tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_tools: usize,
    pub total_calls: u64,
    pub total_errors: u64,
    pub total_execution_time_ms: u64,
}

#[derive(Debug, Default)]
pub struct MetricsStore {
    entries: DashMap<String, ToolMetrics>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero a tool's counters. Called on (re-)registration.
    pub fn reset(&self, tool: &str) {
        self.entries.insert(tool.to_string(), ToolMetrics::default());
    }

    /// Record one completed call and return the updated snapshot.
    pub fn record_call(&self, tool: &str, duration_ms: u64, failed: bool) -> ToolMetrics {
        let mut entry = self.entries.entry(tool.to_string()).or_default();
        entry.calls += 1;
        entry.total_execution_time_ms += duration_ms;
        if failed {
            entry.errors += 1;
        }
        entry.last_used = Some(Utc::now());
        entry.clone()
    }

    /// Count a request refused by input validation. It lands in `rejected`
    /// rather than `errors`: the handler never ran, so it is not a call, and
    /// counting it as an error would let `errors` exceed `calls`.
    pub fn record_rejection(&self, tool: &str) {
        self.entries.entry(tool.to_string()).or_default().rejected += 1;
    }

    pub fn snapshot(&self, tool: &str) -> Option<ToolMetrics> {
        self.entries.get(tool).map(|m| m.clone())
    }

    /// All entries, ordered by tool name.
    pub fn all(&self) -> Vec<(String, ToolMetrics)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn summary(&self) -> MetricsSummary {
        self.entries
            .iter()
            .fold(MetricsSummary::default(), |mut acc, entry| {
                acc.total_tools += 1;
                acc.total_calls += entry.calls;
                acc.total_errors += entry.errors;
                acc.total_execution_time_ms += entry.total_execution_time_ms;
                acc
            })
    }

    pub fn total_calls(&self) -> u64 {
        self.entries.iter().map(|e| e.calls).sum()
    }

    pub fn views(&self) -> Vec<ToolMetricsView> {
        self.all()
            .iter()
            .map(|(name, m)| ToolMetricsView::new(name.as_str(), m))
            .collect()
    }
}
