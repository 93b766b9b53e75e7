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

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::{now_iso, AppState};
use crate::broadcaster::ToolDescriptor;
use crate::tool_registry::ToolFilter;

#[derive(Debug, Default, Deserialize)]
pub struct ToolsQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub calls: u64,
    pub average_execution_time_ms: f64,
    pub error_rate_percent: f64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ToolEntry {
    #[serde(flatten)]
    pub descriptor: ToolDescriptor,
    pub metrics: ToolUsage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsResponse {
    pub tools: Vec<ToolEntry>,
    /// Category name to the names of the matching tools in it.
    pub categories: BTreeMap<String, Vec<String>>,
    pub count: usize,
    pub total_calls: u64,
    pub timestamp: String,
}

/// GET /tools
pub async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<ToolsQuery>,
) -> Json<ToolsResponse> {
    let filter = ToolFilter {
        category: query.category,
        search: query.search,
    };

    let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let tools: Vec<ToolEntry> = state
        .registry
        .list(&filter)
        .iter()
        .map(|tool| {
            let usage = state.metrics.snapshot(&tool.name).unwrap_or_default();
            categories
                .entry(tool.category.clone())
                .or_default()
                .push(tool.name.clone());
            ToolEntry {
                descriptor: ToolDescriptor::from(tool.as_ref()),
                metrics: ToolUsage {
                    calls: usage.calls,
                    average_execution_time_ms: usage.average_execution_time_ms(),
                    error_rate_percent: usage.error_rate_percent(),
                    last_used: usage.last_used,
                },
            }
        })
        .collect();

    Json(ToolsResponse {
        count: tools.len(),
        tools,
        categories,
        total_calls: state.metrics.total_calls(),
        timestamp: now_iso(),
    })
}
