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

//! Sliding-window rate limiter keyed by (tool, client).
//!
//! Each key keeps the timestamps of its admitted calls that still fall inside
//! the trailing window. Prune, test and append happen while holding the
//! DashMap entry guard for that key, so two concurrent calls cannot both take
//! the last slot.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use toolbridge_core::RateLimitPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

type WindowKey = (String, String);

#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: DashMap<WindowKey, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or refuse one call. A refused call is not recorded.
    pub fn check_and_record(
        &self,
        tool: &str,
        policy: Option<&RateLimitPolicy>,
        client_id: &str,
    ) -> RateDecision {
        let Some(policy) = policy else {
            return RateDecision::Allowed;
        };
        let window = policy.window();
        let now = Instant::now();

        let mut stamps = self
            .windows
            .entry((tool.to_string(), client_id.to_string()))
            .or_default();

        while let Some(oldest) = stamps.front() {
            if now.duration_since(*oldest) >= window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        let max = policy.max_requests as usize;
        if stamps.len() >= max {
            let retry_after = stamps
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return RateDecision::Limited { retry_after };
        }

        stamps.push_back(now);
        RateDecision::Allowed
    }

    /// Drop keys whose windows have fully drained.
    pub fn purge_idle(&self, policy_window: impl Fn(&str) -> Option<Duration>) {
        let now = Instant::now();
        self.windows.retain(|(tool, _), stamps| {
            match (policy_window(tool), stamps.back()) {
                (Some(window), Some(newest)) => now.duration_since(*newest) < window,
                _ => false,
            }
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
