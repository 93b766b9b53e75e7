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
    extract::State,
    http::HeaderMap,
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

use crate::api::AppState;
use crate::broadcaster::StreamFrame;

/// GET /sse - Server-Sent Events feed of the catalog, status, and metrics
///
/// Keepalive comments come from the broadcaster on each metrics tick, so the
/// axum keep-alive timer is not used here.
pub async fn sse_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    let stream = state.broadcaster.open(client_id).map(|frame| {
        Ok(match frame {
            StreamFrame::Event(json) => Event::default().data(json),
            StreamFrame::KeepAlive => Event::default().comment("keepalive"),
        })
    });

    Sse::new(stream)
}
