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

//! Execution sandbox
//!
//! Guarded access to the two dangerous capabilities exposed as tools:
//! running subprocesses ([`CommandSandbox`]) and touching the filesystem
//! ([`FileSandbox`]). Both are plain values handed to the tools that need
//! them, so tests can build them with their own limits and roots.

mod command;
mod filesystem;

pub use command::{
    CommandOutput, CommandRequest, CommandSandbox, DENIED_COMMANDS, DENIED_DIRECTORIES,
};
pub use filesystem::{DirEntryInfo, FileOperation, FileOutcome, FileRequest, FileSandbox};

use std::path::Path;
use thiserror::Error;
use toolbridge_core::ToolError;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Command '{command}' is blocked (matches '{pattern}')")]
    CommandDenied { command: String, pattern: String },

    #[error("Working directory '{path}' is not allowed")]
    WorkingDirectoryDenied { path: String },

    #[error("Access to '{path}' is outside the allowed directories")]
    PathDenied { path: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Command timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    /// `path` is the caller's own spelling; the resolved host path is only logged.
    #[error("I/O error on '{path}': {}", source.kind())]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    fn io(requested: &str, resolved: &Path, source: std::io::Error) -> Self {
        tracing::warn!("I/O error on {:?}: {}", resolved, source);
        Self::Io {
            path: requested.to_string(),
            source,
        }
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::CommandDenied { .. } | SandboxError::WorkingDirectoryDenied { .. } => {
                ToolError::security_rejected(err.to_string())
            }
            SandboxError::PathDenied { path } => ToolError::PathDenied { path },
            SandboxError::TimedOut { timeout_ms } => ToolError::Timeout { timeout_ms },
            other => ToolError::execution_failed(other.to_string()),
        }
    }
}
