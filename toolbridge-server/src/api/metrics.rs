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

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::{now_iso, AppState};
use crate::broadcaster::SERVER_VERSION;
use crate::process::{self, MemoryStats};
use crate::tool_registry::{MetricsSummary, ToolMetricsView};

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub uptime: u64,
    pub pid: u32,
    pub memory: MemoryStats,
    /// Percent of one core since the previous sample.
    pub cpu: f32,
    pub version: String,
    pub platform: String,
    pub arch: String,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub server: ServerStats,
    pub tools: Vec<ToolMetricsView>,
    pub summary: MetricsSummary,
    pub timestamp: String,
}

/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let stats = state.process.snapshot();

    Json(MetricsResponse {
        server: ServerStats {
            uptime: state.process.uptime_secs(),
            pid: stats.pid,
            memory: stats.memory,
            cpu: stats.cpu_percent,
            version: SERVER_VERSION.to_string(),
            platform: process::platform().to_string(),
            arch: process::arch().to_string(),
        },
        tools: state.metrics.views(),
        summary: state.metrics.summary(),
        timestamp: now_iso(),
    })
}
