// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Ragmetrics Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub clients: ClientCacheConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP listen address (e.g., "0.0.0.0:8000")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Route of the MCP JSON-RPC endpoint
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,

    /// Upper bound on one metric computation, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientCacheConfig {
    /// Reuse constructed LLM/embedding clients across tool calls
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Remote metric server endpoints, tried in order (empty = in-process)
    #[serde(default)]
    pub metric_server_urls: Vec<String>,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
}

// Default values
fn default_http_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_mcp_path() -> String {
    "/mcp".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_enable_cors() -> bool {
    true
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    256
}

fn default_health_timeout() -> u64 {
    5
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            mcp_path: default_mcp_path(),
            request_timeout_secs: default_request_timeout(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            metric_server_urls: Vec::new(),
            health_timeout_secs: default_health_timeout(),
        }
    }
}

impl Default for ClientCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

pub const ENV_HTTP_ADDR: &str = "RAGMETRICS_HTTP_ADDR";
pub const ENV_MCP_PATH: &str = "RAGMETRICS_MCP_PATH";
pub const ENV_REQUEST_TIMEOUT: &str = "RAGMETRICS_REQUEST_TIMEOUT";
pub const ENV_ENABLE_CORS: &str = "RAGMETRICS_ENABLE_CORS";
pub const ENV_CLIENT_CACHE: &str = "RAGMETRICS_CLIENT_CACHE";
pub const ENV_CLIENT_CACHE_TTL: &str = "RAGMETRICS_CLIENT_CACHE_TTL";
pub const ENV_METRIC_SERVER_URLS: &str = "RAGMETRICS_METRIC_SERVER_URLS";

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env > file > defaults
    ///
    /// Supported environment variables:
    /// - RAGMETRICS_HTTP_ADDR: HTTP listen address (default: 0.0.0.0:8000)
    /// - RAGMETRICS_MCP_PATH: MCP endpoint route (default: /mcp)
    /// - RAGMETRICS_REQUEST_TIMEOUT: Metric timeout in seconds (default: 120)
    /// - RAGMETRICS_ENABLE_CORS: Enable CORS (default: true)
    /// - RAGMETRICS_CLIENT_CACHE: Cache constructed clients (default: true)
    /// - RAGMETRICS_CLIENT_CACHE_TTL: Client cache TTL in seconds (default: 300)
    /// - RAGMETRICS_METRIC_SERVER_URLS: Comma-separated remote metric servers
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        Ok(config.merge_with(|key| std::env::var(key).ok()))
    }

    /// Override fields whose variable is set; unparsable values are ignored
    pub fn merge_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get(ENV_HTTP_ADDR) {
            self.server.listen_addr = addr.trim().to_string();
        }
        if let Some(path) = get(ENV_MCP_PATH) {
            self.server.mcp_path = path.trim().to_string();
        }
        if let Some(timeout) = parse_var(ENV_REQUEST_TIMEOUT, get(ENV_REQUEST_TIMEOUT)) {
            self.server.request_timeout_secs = timeout;
        }
        if let Some(cors) = parse_var(ENV_ENABLE_CORS, get(ENV_ENABLE_CORS)) {
            self.server.enable_cors = cors;
        }
        if let Some(enabled) = parse_var(ENV_CLIENT_CACHE, get(ENV_CLIENT_CACHE)) {
            self.clients.enabled = enabled;
        }
        if let Some(ttl) = parse_var(ENV_CLIENT_CACHE_TTL, get(ENV_CLIENT_CACHE_TTL)) {
            self.clients.ttl_secs = ttl;
        }
        if let Some(urls) = get(ENV_METRIC_SERVER_URLS) {
            self.workflow.metric_server_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }

        self
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        let path = &self.server.mcp_path;
        if !path.starts_with('/') || path.trim_end_matches('/').is_empty() {
            anyhow::bail!(
                "mcp_path must be an absolute route such as /mcp, got '{}'",
                self.server.mcp_path
            );
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        if self.clients.enabled && self.clients.max_capacity == 0 {
            anyhow::bail!("clients.max_capacity must be greater than zero when caching is enabled");
        }
        for raw in &self.workflow.metric_server_urls {
            let parsed = url::Url::parse(raw)
                .map_err(|e| anyhow::anyhow!("Invalid metric server URL '{}': {}", raw, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Metric server URL '{}' must use http or https", raw);
            }
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}
