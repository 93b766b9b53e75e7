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

use crate::sandbox::{FileOperation, FileOutcome, FileRequest, FileSandbox};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use toolbridge_core::{
    ContentBlock, ExecutionContext, Field, RateLimitPolicy, Result, Schema, ToolDefinition,
    ToolError, ToolHandler, ToolResult,
};

#[derive(Debug, Deserialize)]
struct FileOperationsParams {
    operation: FileOperation,
    path: String,
    content: Option<String>,
    recursive: bool,
}

pub struct FileOperationsTool {
    sandbox: FileSandbox,
}

impl FileOperationsTool {
    pub fn new(sandbox: FileSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolHandler for FileOperationsTool {
    async fn call(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let params: FileOperationsParams = serde_json::from_value(params)
            .map_err(|e| ToolError::internal(format!("bad fileOperations params: {e}")))?;

        tracing::info!(
            request_id = %ctx.request_id,
            "fileOperations: {:?} {}",
            params.operation,
            params.path
        );

        let outcome = self
            .sandbox
            .perform(FileRequest {
                operation: params.operation,
                path: params.path,
                content: params.content,
                recursive: params.recursive,
            })
            .await?;

        let summary = summarize(&outcome);
        Ok(ToolResult::text(summary).with_block(ContentBlock::json(json!(outcome))))
    }
}

fn summarize(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Read { content, .. } => content.clone(),
        FileOutcome::Write {
            path,
            bytes_written,
        } => format!("Wrote {bytes_written} bytes to {path}"),
        FileOutcome::List { path, entries } => {
            format!("{} entries in {}", entries.len(), path)
        }
        FileOutcome::Exists { path, exists } => {
            if *exists {
                format!("{path} exists")
            } else {
                format!("{path} does not exist")
            }
        }
        FileOutcome::Stat {
            path,
            size,
            is_directory,
            ..
        } => {
            let kind = if *is_directory { "directory" } else { "file" };
            format!("{path}: {kind}, {size} bytes")
        }
        FileOutcome::Mkdir { path, .. } => format!("Created directory {path}"),
    }
}

pub fn file_operations_tool(sandbox: FileSandbox) -> ToolDefinition {
    let schema = Schema::object(vec![
        Field::required("operation", Schema::enumeration(FileOperation::ALL)),
        Field::required("path", Schema::string().min(1.0)).describe("Target path"),
        Field::optional("content", Schema::string()).describe("Content for write"),
        Field::optional("encoding", Schema::enumeration(["utf8", "utf-8"]))
            .with_default(json!("utf8")),
        Field::optional("recursive", Schema::boolean())
            .with_default(json!(false))
            .describe("Create parent directories for mkdir"),
    ]);

    ToolDefinition::new(
        "fileOperations",
        "Perform file system operations within allowed directories",
        "System",
        schema,
        Arc::new(FileOperationsTool::new(sandbox)),
    )
    .with_permissions(["filesystem:read", "filesystem:write"])
    .with_rate_limit(RateLimitPolicy::per_minute(20))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn call(tool: &ToolDefinition, params: Value) -> Result<ToolResult> {
        let params = tool.schema.validate(&params).unwrap();
        tool.handler
            .call(params, &ExecutionContext::new("req-test"))
            .await
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let tool = file_operations_tool(FileSandbox::new([dir.path()]));
        let path = dir.path().join("a.txt").to_string_lossy().into_owned();

        let written = call(
            &tool,
            json!({ "operation": "write", "path": path, "content": "data" }),
        )
        .await
        .unwrap();
        assert!(written.content[0].text.as_deref().unwrap().starts_with("Wrote 4 bytes"));

        let read = call(&tool, json!({ "operation": "read", "path": path }))
            .await
            .unwrap();
        assert_eq!(read.content[0].text.as_deref(), Some("data"));
        assert_eq!(read.content[1].data.as_ref().unwrap()["operation"], "read");
    }

    #[tokio::test]
    async fn test_etc_passwd_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = file_operations_tool(FileSandbox::new([dir.path()]));
        let err = call(&tool, json!({ "operation": "read", "path": "/etc/passwd" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PATH_DENIED");
    }

    #[test]
    fn test_schema_rejects_unknown_operation() {
        let tool = file_operations_tool(FileSandbox::new(Vec::<std::path::PathBuf>::new()));
        let issues = tool
            .schema
            .validate(&json!({ "operation": "delete", "path": "/tmp/x" }))
            .unwrap_err();
        assert_eq!(issues[0].code, "invalid_enum_value");
        assert_eq!(tool.rate_limit, Some(RateLimitPolicy::per_minute(20)));
    }
}
