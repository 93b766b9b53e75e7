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

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::debug;

use crate::api::{now_iso, AppState};
use crate::broadcaster::SERVER_VERSION;
use crate::process::MemoryStats;

/// Health check response structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime: u64,
    pub timestamp: String,
    pub tools_count: usize,
    pub version: String,
    pub memory: MemoryStats,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub registry: String,
    pub memory: String,
}

impl HealthChecks {
    fn healthy(&self) -> bool {
        self.registry == "loaded" && self.memory == "ok"
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");

    let memory = state.process.snapshot().memory;
    let checks = HealthChecks {
        registry: if state.registry.is_empty() {
            "empty".to_string()
        } else {
            "loaded".to_string()
        },
        memory: if memory.rss_bytes > state.memory_threshold_bytes {
            "high".to_string()
        } else {
            "ok".to_string()
        },
    };
    let healthy = checks.healthy();

    let health = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        uptime: state.process.uptime_secs(),
        timestamp: now_iso(),
        tools_count: state.registry.len(),
        version: SERVER_VERSION.to_string(),
        memory,
        checks,
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}
