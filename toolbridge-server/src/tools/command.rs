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

use crate::sandbox::{CommandRequest, CommandSandbox};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::{
    ContentBlock, ExecutionContext, Field, RateLimitPolicy, Result, Schema, ToolDefinition,
    ToolError, ToolHandler, ToolResult,
};

/// Slack on top of the command timeout so the sandbox reports the timeout,
/// not the dispatcher.
const HANDLER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteCommandParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    timeout: u64,
    #[serde(default)]
    env: HashMap<String, String>,
    capture_output: bool,
}

pub struct ExecuteCommandTool {
    sandbox: CommandSandbox,
}

impl ExecuteCommandTool {
    pub fn new(sandbox: CommandSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolHandler for ExecuteCommandTool {
    async fn call(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let params: ExecuteCommandParams = serde_json::from_value(params)
            .map_err(|e| ToolError::internal(format!("bad executeCommand params: {e}")))?;

        tracing::info!(
            request_id = %ctx.request_id,
            "executeCommand: {} {:?}",
            params.command,
            params.args
        );

        let output = self
            .sandbox
            .run(CommandRequest {
                command: params.command,
                args: params.args,
                cwd: params.working_directory,
                timeout: Duration::from_millis(params.timeout),
                env: params.env,
                capture_output: params.capture_output,
            })
            .await?;

        let details = ContentBlock::json(json!(output));
        if output.success() {
            let text = if output.stdout.is_empty() {
                "Command completed with no output".to_string()
            } else {
                output.stdout.clone()
            };
            Ok(ToolResult::text(text).with_block(details))
        } else {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let message = format!(
                "Command failed with exit code {}: {}",
                code,
                output.stderr.trim()
            );
            Ok(ToolResult::error(message, "EXECUTION_FAILED").with_block(details))
        }
    }
}

pub fn execute_command_tool(sandbox: CommandSandbox) -> ToolDefinition {
    let max_ms = sandbox.max_timeout().as_millis() as f64;
    let timeout = sandbox.max_timeout() + HANDLER_GRACE;
    let schema = Schema::object(vec![
        Field::required("command", Schema::string().min(1.0)).describe("Executable to run"),
        Field::optional("args", Schema::array(Schema::string()))
            .with_default(json!([]))
            .describe("Command arguments"),
        Field::optional("workingDirectory", Schema::string())
            .describe("Directory to run the command in"),
        Field::optional("timeout", Schema::integer().min(1000.0).max(max_ms.max(1000.0)))
            .with_default(json!(10_000))
            .describe("Timeout in milliseconds"),
        Field::optional("env", Schema::map(Schema::string()))
            .describe("Extra environment variables"),
        Field::optional("captureOutput", Schema::boolean()).with_default(json!(true)),
    ]);

    ToolDefinition::new(
        "executeCommand",
        "Execute a system command with security restrictions",
        "System",
        schema,
        Arc::new(ExecuteCommandTool::new(sandbox)),
    )
    .with_permissions(["system:execute"])
    .with_rate_limit(RateLimitPolicy::per_minute(10))
    .with_timeout(timeout)
}
