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

//! Error taxonomy for tool dispatch and execution.

use crate::schema::ValidationIssue;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors surfaced by the tool runtime.
///
/// Everything up to and including `RateLimitExceeded` is detected before a
/// handler runs. The remaining variants are produced by handlers (or the
/// sandbox providers they call) and end up wrapped in an error `ToolResult`.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Parameter validation failed ({} issue(s))", issues.len())]
    ValidationFailed { issues: Vec<ValidationIssue> },

    #[error("Tool '{name}' not found. Available tools: {}", available.join(", "))]
    ToolNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Rate limit exceeded for tool '{tool}'")]
    RateLimitExceeded { tool: String, retry_after_ms: u64 },

    #[error("Rejected for security reasons: {reason}")]
    SecurityRejected { reason: String },

    #[error("Path access denied: {path}")]
    PathDenied { path: String },

    #[error("{message}")]
    ExecutionFailed { message: String },

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ToolError {
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    pub fn security_rejected(reason: impl Into<String>) -> Self {
        Self::SecurityRejected {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::SecurityRejected { .. } => "SECURITY_REJECTED",
            Self::PathDenied { .. } => "PATH_DENIED",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
