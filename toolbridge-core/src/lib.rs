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

//! Toolbridge Core
//!
//! Data model shared by the tool runtime: tool definitions, handler contract,
//! declarative input schemas, results, and the error taxonomy.

pub mod error;
pub mod schema;
pub mod tool_definition;

pub use error::{Result, ToolError};
pub use schema::{Field, Schema, ValidationIssue};
pub use tool_definition::{
    generate_request_id, handler_fn, CallerContext, ContentBlock, ContentKind, ExecutionContext,
    FnHandler, RateLimitPolicy, ResultMetadata, ToolDefinition, ToolHandler, ToolResult,
};
