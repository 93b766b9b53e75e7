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

//! Tool Registry Service
//!
//! Named, schema-validated tools and the machinery around calling them:
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                  ToolDispatcher                   │
//! │  lookup ─► validate ─► rate limit ─► execute      │
//! └──────┬──────────────────────┬──────────────┬──────┘
//!        │                      │              │
//!        ▼                      ▼              ▼
//! ┌──────────────┐  ┌──────────────────────┐  ┌──────────────┐
//! │ ToolRegistry │  │ SlidingWindowLimiter │  │ MetricsStore │
//! │  (DashMap)   │  │ (tool, client) keys  │  │  (DashMap)   │
//! └──────────────┘  └──────────────────────┘  └──────────────┘
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Validation before rate limiting**: malformed requests are refused
//!    without consuming a slot and are counted as `rejected`, not as calls.
//!
//! 2. **Mandatory time box**: every handler runs under `tokio::time::timeout`;
//!    a definition without its own timeout gets the registry default.

mod dispatcher;
mod metrics;
mod rate_limiter;
mod registry;

pub(crate) use dispatcher::panic_message;
pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use metrics::{MetricsStore, MetricsSummary, ToolMetrics, ToolMetricsView};
pub use rate_limiter::{RateDecision, SlidingWindowLimiter};
pub use registry::{ToolFilter, ToolRegistry, ToolRegistryError};
