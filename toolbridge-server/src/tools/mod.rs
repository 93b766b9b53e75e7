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

//! Built-in tools backed by the execution sandbox.

mod command;
mod files;

pub use command::{execute_command_tool, ExecuteCommandTool};
pub use files::{file_operations_tool, FileOperationsTool};

use crate::sandbox::{CommandSandbox, FileSandbox};
use crate::tool_registry::{ToolRegistry, ToolRegistryError};

/// Register `executeCommand` and `fileOperations` with their sandboxes.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    commands: CommandSandbox,
    files: FileSandbox,
) -> Result<(), ToolRegistryError> {
    registry.register(execute_command_tool(commands))?;
    registry.register(file_operations_tool(files))?;
    Ok(())
}
