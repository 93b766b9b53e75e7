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

pub mod api;
pub mod broadcaster;
pub mod config;
pub mod middleware;
pub mod process;
pub mod sandbox;
pub mod tool_registry;
pub mod tools;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use api::{
    execute_tool, get_metrics, health_check, list_tools, not_found, sse_stream, ApiError, AppState,
};
use config::{HttpServerConfig, LogFormat, LoggingConfig, ServerConfig};
use middleware::{request_limit_middleware, RequestLimiter};
use process::ProcessMonitor;
use sandbox::{CommandSandbox, FileSandbox};
use tool_registry::{MetricsStore, ToolRegistry};

/// How often empty rate windows are swept.
const RATE_WINDOW_SWEEP: Duration = Duration::from_secs(60);

/// Largest request body any route will buffer.
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers set on every response unless a handler already chose a value.
const SECURITY_HEADERS: &[(HeaderName, &str)] = &[
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::CONTENT_SECURITY_POLICY, "default-src 'none'; frame-ancestors 'none'"),
    (header::X_DNS_PREFETCH_CONTROL, "off"),
];

type FormatLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Switches the output format of an installed subscriber.
pub struct TracingHandle(reload::Handle<FormatLayer, Registry>);

impl TracingHandle {
    pub fn set_format(&self, format: LogFormat) {
        if let Err(e) = self.0.reload(format_layer(format)) {
            eprintln!("Could not switch log format: {e}");
        }
    }
}

fn format_layer(format: LogFormat) -> FormatLayer {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Called before the config file is read; the returned handle applies the
/// file's `[logging]` format once it is known.
pub fn init_tracing(logging: &LoggingConfig) -> TracingHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "toolbridge_server=info,tower_http=info".into());
    let (format, handle) = reload::Layer::new(format_layer(logging.format));

    if let Err(e) = tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .try_init()
    {
        eprintln!("Tracing already initialized: {e}");
    }
    TracingHandle(handle)
}

/// Registry with the built-in tools, plus the stores around it.
pub fn build_state(config: &ServerConfig) -> Result<AppState> {
    let metrics = Arc::new(MetricsStore::new());
    let registry = Arc::new(ToolRegistry::new(
        metrics,
        config.runtime.default_tool_timeout(),
    ));

    let files = FileSandbox::with_default_roots(&config.sandbox.extra_allowed_roots);
    tracing::info!("File sandbox roots: {:?}", files.allowed_roots());
    tools::register_builtin_tools(
        &registry,
        CommandSandbox::new(Duration::from_millis(config.sandbox.max_command_timeout_ms)),
        files,
    )?;

    tracing::info!(
        "Registered {} tools across {} categories",
        registry.len(),
        registry.categories().len()
    );

    Ok(AppState::new(
        registry,
        Arc::new(ProcessMonitor::new()),
        config.metrics_interval(),
        config.runtime.memory_threshold_bytes,
    ))
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let limiter = Arc::new(RequestLimiter::new(config.server.request_limit.clone()));

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/execute", post(execute_tool))
        .route("/sse", get(sse_stream))
        .route("/metrics", get(get_metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            limiter,
            request_limit_middleware,
        ))
        .layer(cors_layer(&config.server));

    harden(router).layer(TraceLayer::new_for_http())
}

/// Body limit, security headers and panic containment shared by every route.
fn harden(router: Router) -> Router {
    // Panic responses pass back through the header layers.
    let router = router.layer(CatchPanicLayer::custom(panic_response));
    SECURITY_HEADERS
        .iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                name.clone(),
                HeaderValue::from_static(*value),
            ))
        })
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
}

fn panic_response(payload: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = tool_registry::panic_message(payload.as_ref()).to_string();
    ApiError::Internal(format!("request handler panicked: {detail}")).into_response()
}

fn cors_layer(server: &HttpServerConfig) -> CorsLayer {
    if !server.enable_cors {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.cors_origins.is_empty() {
        tracing::warn!("CORS: Allowing all origins. Set cors_origins in production!");
        return cors.allow_origin(Any);
    }

    tracing::info!("CORS: Allowing origins: {:?}", server.cors_origins);
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("CORS: Ignoring invalid origin '{}'", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Toolbridge Server v{}", broadcaster::SERVER_VERSION);
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;

    let state = build_state(&config)?;

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_WINDOW_SWEEP);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            dispatcher.purge_idle_windows();
        }
    });

    let app = build_router(state, &config);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Toolbridge listening on http://{}", addr);
    tracing::info!("  GET  /health   - health check");
    tracing::info!("  GET  /tools    - tool catalog");
    tracing::info!("  POST /execute  - run a tool");
    tracing::info!("  GET  /sse      - live event stream");
    tracing::info!("  GET  /metrics  - server and tool metrics");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_build_state_registers_builtin_tools() {
        let state = build_state(&ServerConfig::default()).unwrap();
        assert_eq!(state.registry.names(), vec!["executeCommand", "fileOperations"]);
        assert_eq!(state.registry.categories(), vec!["System".to_string()]);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_only() {
        let mut config = ServerConfig::default();
        config.server.cors_origins = vec!["http://localhost:5173".into(), "bad\norigin".into()];
        let app = build_router(build_state(&config).unwrap(), &config);

        let request = |origin: &'static str| {
            axum::http::Request::builder()
                .uri("/tools")
                .header("Origin", origin)
                .body(Body::empty())
                .unwrap()
        };

        let allowed = app.clone().oneshot(request("http://localhost:5173")).await.unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );

        let other = app.oneshot(request("http://evil.example")).await.unwrap();
        assert!(other.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_tracing_format_can_be_switched_after_init() {
        let handle = init_tracing(&LoggingConfig::default());
        handle.set_format(LogFormat::Json);
        handle.set_format(LogFormat::Pretty);
        tracing::info!("still logging");
    }

    async fn exploding_route() -> &'static str {
        panic!("route exploded")
    }

    #[tokio::test]
    async fn test_route_panic_becomes_500_envelope() {
        let app = harden(Router::new().route("/boom", get(exploding_route)));
        let request = axum::http::Request::builder()
            .uri("/boom")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["isError"], true);
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("route exploded"));
    }

    #[tokio::test]
    async fn test_handler_headers_are_not_overridden() {
        let route = || async { ([(header::X_FRAME_OPTIONS, "SAMEORIGIN")], "framed") };
        let app = harden(Router::new().route("/framed", get(route)));
        let request = axum::http::Request::builder()
            .uri("/framed")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
        assert_eq!(response.headers()["referrer-policy"], "no-referrer");
    }
}
