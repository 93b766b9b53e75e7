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

//! Tool Registry - registration and lookup
//!
//! Definitions are stored behind `Arc` so a lookup never holds a map guard
//! while the handler runs. Registering a name twice replaces the first
//! definition and zeroes its metrics.

use super::metrics::MetricsStore;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use toolbridge_core::ToolDefinition;

#[derive(Debug, Error)]
pub enum ToolRegistryError {
    #[error("Invalid tool definition: {reason}")]
    InvalidDefinition { reason: String },
}

/// Filter for [`ToolRegistry::list`]. Both matches are case-insensitive
/// substring matches.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub category: Option<String>,
    /// Matched against name and description.
    pub search: Option<String>,
}

impl ToolFilter {
    fn matches(&self, tool: &ToolDefinition) -> bool {
        if let Some(category) = non_empty(&self.category) {
            if !tool
                .category
                .to_lowercase()
                .contains(&category.to_lowercase())
            {
                return false;
            }
        }
        if let Some(search) = non_empty(&self.search) {
            let needle = search.to_lowercase();
            if !tool.name.to_lowercase().contains(&needle)
                && !tool.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub struct ToolRegistry {
    tools: DashMap<String, Arc<ToolDefinition>>,
    metrics: Arc<MetricsStore>,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(metrics: Arc<MetricsStore>, default_timeout: Duration) -> Self {
        Self {
            tools: DashMap::new(),
            metrics,
            default_timeout,
        }
    }

    /// Register a tool, replacing any definition with the same name.
    ///
    /// A definition without a timeout gets the registry default.
    pub fn register(&self, mut tool: ToolDefinition) -> Result<(), ToolRegistryError> {
        if tool.name.trim().is_empty() {
            return Err(ToolRegistryError::InvalidDefinition {
                reason: "tool name must not be empty".to_string(),
            });
        }
        match tool.timeout {
            Some(t) if t.is_zero() => {
                return Err(ToolRegistryError::InvalidDefinition {
                    reason: format!("tool '{}' has a zero timeout", tool.name),
                });
            }
            Some(_) => {}
            None => tool.timeout = Some(self.default_timeout),
        }
        if let Some(policy) = &tool.rate_limit {
            if policy.max_requests == 0 || policy.window_ms == 0 {
                return Err(ToolRegistryError::InvalidDefinition {
                    reason: format!("tool '{}' has an empty rate limit window", tool.name),
                });
            }
        }

        let name = tool.name.clone();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!("Tool '{}' already registered, overwriting", name);
        } else {
            tracing::info!("Registered tool '{}'", name);
        }
        self.metrics.reset(&name);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.tools.get(name).map(|t| t.value().clone())
    }

    /// Tools matching `filter`, ordered by name.
    pub fn list(&self, filter: &ToolFilter) -> Vec<Arc<ToolDefinition>> {
        let mut tools: Vec<_> = self
            .tools
            .iter()
            .filter(|t| filter.matches(t.value()))
            .map(|t| t.value().clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    pub fn categories(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn metrics(&self) -> &Arc<MetricsStore> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use toolbridge_core::{handler_fn, ExecutionContext, Schema, ToolResult};

    fn tool(name: &str, category: &str, description: &str) -> ToolDefinition {
        ToolDefinition::new(
            name,
            description,
            category,
            Schema::object(vec![]),
            handler_fn(|_: Value, _: ExecutionContext| async { Ok(ToolResult::text("ok")) }),
        )
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(MetricsStore::new()), Duration::from_secs(5))
    }

    #[test]
    fn test_register_is_idempotent_and_resets_metrics() {
        let registry = registry();
        registry.register(tool("echo", "Utility", "first")).unwrap();
        registry.metrics().record_call("echo", 3, false);

        registry.register(tool("echo", "Utility", "second")).unwrap();
        registry.register(tool("echo", "Utility", "second")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("echo").unwrap().description, "second");
        assert_eq!(registry.metrics().snapshot("echo").unwrap().calls, 0);
    }

    #[test]
    fn test_default_timeout_applied() {
        let registry = registry();
        registry.register(tool("echo", "Utility", "")).unwrap();
        assert_eq!(
            registry.lookup("echo").unwrap().timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        let registry = registry();
        assert!(registry.register(tool("  ", "Utility", "")).is_err());
        assert!(registry
            .register(tool("slow", "Utility", "").with_timeout(Duration::ZERO))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_filters_and_orders() {
        let registry = registry();
        registry
            .register(tool("fileOperations", "System", "Read and write files"))
            .unwrap();
        registry
            .register(tool("executeCommand", "System", "Run a command"))
            .unwrap();
        registry
            .register(tool("echo", "Utility", "Echo text back"))
            .unwrap();

        let all: Vec<_> = registry
            .list(&ToolFilter::default())
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(all, vec!["echo", "executeCommand", "fileOperations"]);

        let system = registry.list(&ToolFilter {
            category: Some("sys".into()),
            search: None,
        });
        assert_eq!(system.len(), 2);

        let by_description = registry.list(&ToolFilter {
            category: None,
            search: Some("FILES".into()),
        });
        assert_eq!(by_description.len(), 1);
        assert_eq!(by_description[0].name, "fileOperations");

        assert_eq!(registry.categories(), vec!["System", "Utility"]);
        assert_eq!(
            registry.names(),
            vec!["echo", "executeCommand", "fileOperations"]
        );
    }
}
