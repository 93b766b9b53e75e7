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

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use toolbridge_core::{generate_request_id, CallerContext};

use crate::api::{ApiError, AppState};
use crate::middleware::extract_client_ip;
use crate::MAX_REQUEST_BODY_BYTES;

/// Echoes the dispatch request id on successful responses.
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestContext {
    user_id: Option<String>,
    session_id: Option<String>,
}

/// POST /execute
///
/// Handler failures come back as 200 with `isError: true`; only failures
/// before the handler runs map to 4xx.
pub async fn execute_tool(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let request_id = generate_request_id();

    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return ApiError::PayloadTooLarge {
                limit_bytes: MAX_REQUEST_BODY_BYTES,
            }
            .into_response_with(request_id)
        }
        Err(rejection) => {
            return ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
                .into_response_with(request_id)
        }
    };

    let tool = match body.get("tool").and_then(Value::as_str) {
        Some(tool) if !tool.is_empty() => tool.to_string(),
        _ => {
            return ApiError::BadRequest("Tool name is required and must be a string".to_string())
                .into_response_with(request_id)
        }
    };

    let context: RequestContext = body
        .get("context")
        .cloned()
        .and_then(|ctx| serde_json::from_value(ctx).ok())
        .unwrap_or_default();

    let caller = CallerContext {
        client_id: client_id(&headers, connect.as_ref()),
        request_id: Some(request_id.clone()),
        user_id: context.user_id,
        session_id: context.session_id,
    };

    let params = body.get("params").cloned();
    match state.dispatcher.execute(&tool, params, caller).await {
        Ok(outcome) => {
            let mut response = Json(outcome.result).into_response();
            if let Ok(value) = HeaderValue::from_str(&outcome.request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        }
        Err(err) => ApiError::from(err).into_response_with(request_id),
    }
}

/// `x-client-id`, else the caller IP, else `"unknown"`.
fn client_id(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| extract_client_ip(headers))
        .or_else(|| connect.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
