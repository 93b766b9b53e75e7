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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Toolbridge Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP listen address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per-IP request ceiling applied to every route
    #[serde(default)]
    pub request_limit: RequestLimitConfig,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
            request_limit: RequestLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestLimitConfig {
    #[serde(default = "default_request_limit_enabled")]
    pub enabled: bool,

    /// Maximum requests per window per IP
    #[serde(default = "default_request_limit_max_requests")]
    pub max_requests: u32,

    /// Time window in seconds
    #[serde(default = "default_request_limit_window_secs")]
    pub window_secs: u64,

    /// Upper bound on tracked client IPs
    #[serde(default = "default_request_limit_max_clients")]
    pub max_clients: u64,
}

impl Default for RequestLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_request_limit_enabled(),
            max_requests: default_request_limit_max_requests(),
            window_secs: default_request_limit_window_secs(),
            max_clients: default_request_limit_max_clients(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Handler time box for tools that do not set their own
    #[serde(default = "default_tool_timeout_ms")]
    pub default_tool_timeout_ms: u64,

    /// Resident memory above which `/health` reports degraded
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_bytes: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_tool_timeout_ms: default_tool_timeout_ms(),
            memory_threshold_bytes: default_memory_threshold(),
        }
    }
}

impl RuntimeConfig {
    pub fn default_tool_timeout(&self) -> Duration {
        Duration::from_millis(self.default_tool_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Seconds between metrics events on each stream connection
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: default_metrics_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Ceiling for executeCommand timeouts
    #[serde(default = "default_max_command_timeout")]
    pub max_command_timeout_ms: u64,

    /// Roots allowed for fileOperations in addition to cwd and temp dirs
    #[serde(default)]
    pub extra_allowed_roots: Vec<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_command_timeout_ms: default_max_command_timeout(),
            extra_allowed_roots: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Anything but `json` (any case) is the human format.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Logging settings known before any config file is read.
    pub fn from_env() -> Self {
        Self {
            format: std::env::var("TOOLBRIDGE_LOG_FORMAT")
                .map(|name| LogFormat::from_name(&name))
                .unwrap_or_default(),
        }
    }
}

// Default values
fn default_http_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_request_limit_enabled() -> bool {
    true
}

fn default_request_limit_max_requests() -> u32 {
    100
}

fn default_request_limit_window_secs() -> u64 {
    15 * 60
}

fn default_request_limit_max_clients() -> u64 {
    10_000
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

fn default_memory_threshold() -> u64 {
    1024 * 1024 * 1024
}

fn default_metrics_interval() -> u64 {
    30
}

fn default_max_command_timeout() -> u64 {
    30_000
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// Supported environment variables:
    /// - TOOLBRIDGE_HTTP_ADDR: HTTP listen address (default: 0.0.0.0:3000)
    /// - PORT: listen port, keeping the configured host
    /// - ALLOWED_ORIGINS: comma-separated CORS origins
    /// - TOOLBRIDGE_REQUEST_LIMIT: per-IP requests per window (0 disables)
    /// - TOOLBRIDGE_REQUEST_WINDOW_SECS: per-IP window in seconds
    /// - TOOLBRIDGE_METRICS_INTERVAL_SECS: stream metrics interval
    /// - TOOLBRIDGE_LOG_FORMAT: "pretty" or "json"
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("TOOLBRIDGE_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.set_port(port),
                Err(_) => tracing::warn!("Ignoring invalid PORT value '{}'", port),
            }
        }

        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(limit) = std::env::var("TOOLBRIDGE_REQUEST_LIMIT") {
            if let Ok(val) = limit.parse::<u32>() {
                self.server.request_limit.enabled = val > 0;
                if val > 0 {
                    self.server.request_limit.max_requests = val;
                }
            }
        }

        if let Ok(window) = std::env::var("TOOLBRIDGE_REQUEST_WINDOW_SECS") {
            if let Ok(val) = window.parse() {
                self.server.request_limit.window_secs = val;
            }
        }

        if let Ok(interval) = std::env::var("TOOLBRIDGE_METRICS_INTERVAL_SECS") {
            if let Ok(val) = interval.parse() {
                self.stream.metrics_interval_secs = val;
            }
        }

        if let Ok(format) = std::env::var("TOOLBRIDGE_LOG_FORMAT") {
            self.logging.format = LogFormat::from_name(&format);
        }

        self
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Ok(config.merge_with_env())
    }

    /// Replace the port of `listen_addr`, keeping its host.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.server.listen_addr.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.server.listen_addr.clone(),
        };
        self.server.listen_addr = format!("{host}:{port}");
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.stream.metrics_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.stream.metrics_interval_secs == 0 {
            anyhow::bail!("stream.metrics_interval_secs must be greater than 0");
        }
        if self.runtime.default_tool_timeout_ms == 0 {
            anyhow::bail!("runtime.default_tool_timeout_ms must be greater than 0");
        }
        if self.sandbox.max_command_timeout_ms == 0 {
            anyhow::bail!("sandbox.max_command_timeout_ms must be greater than 0");
        }
        let limit = &self.server.request_limit;
        if limit.enabled && (limit.max_requests == 0 || limit.window_secs == 0) {
            anyhow::bail!("server.request_limit needs non-zero max_requests and window_secs");
        }

        Ok(())
    }
}
