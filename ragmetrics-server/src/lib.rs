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

pub mod config;
pub mod mcp;
pub mod tools;

use anyhow::Result;
use axum::Router;
use config::ServerConfig;
use mcp::{McpServer, ToolRegistry};
use ragmetrics_core::{ClientCache, ClientFactory};
use std::sync::Arc;
use std::time::Duration;
use tools::{
    ClientSource, EnvClientSource, MetricKind, MetricTool, RemoteMetricServers, WorkflowBackend,
    WorkflowTool,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_VAR: &str = "RAGMETRICS_LOG_FORMAT";

/// Install the global tracing subscriber (`RAGMETRICS_LOG_FORMAT=json` for JSON lines)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "ragmetrics_server=info,ragmetrics_core=info,ragmetrics_evals=info,tower_http=info".into()
    });
    let json = std::env::var(LOG_FORMAT_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

/// Client source backed by the process environment, cached per config
pub fn env_client_source(config: &ServerConfig) -> Arc<dyn ClientSource> {
    let mut factory = ClientFactory::new();
    if config.clients.enabled {
        factory = factory.with_cache(Arc::new(ClientCache::new(
            config.clients.max_capacity,
            Duration::from_secs(config.clients.ttl_secs),
        )));
    }
    Arc::new(EnvClientSource::new(factory))
}

/// Register the five metric tools and the workflow tool
pub fn build_registry(config: &ServerConfig, clients: Arc<dyn ClientSource>) -> Result<Arc<ToolRegistry>> {
    let timeout = config.request_timeout();

    // Metric tools live in their own registry too, for in-process workflow runs
    let metrics = Arc::new(ToolRegistry::new());
    let registry = Arc::new(ToolRegistry::new());
    for kind in MetricKind::ALL {
        let tool = Arc::new(MetricTool::new(kind, clients.clone(), timeout));
        metrics.register(tool.clone())?;
        registry.register(tool)?;
    }

    let backend = if config.workflow.metric_server_urls.is_empty() {
        WorkflowBackend::Local(metrics)
    } else {
        tracing::info!(
            urls = ?config.workflow.metric_server_urls,
            "Workflow metrics will run on a remote metric server"
        );
        WorkflowBackend::Remote(RemoteMetricServers::new(
            config.workflow.metric_server_urls.clone(),
            Duration::from_secs(config.workflow.health_timeout_secs),
            timeout,
        ))
    };
    registry.register(Arc::new(WorkflowTool::new(backend)))?;

    Ok(registry)
}

/// Full HTTP application: MCP routes plus CORS and request tracing
pub fn app(config: &ServerConfig, registry: Arc<ToolRegistry>) -> Router {
    let router = McpServer::new(registry, config.server.mcp_path.clone()).router();

    let cors = if config.server.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    router.layer(cors).layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Ragmetrics MCP Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;
    let addr = config.socket_addr()?;

    let registry = build_registry(&config, env_client_source(&config))?;
    tracing::info!(tools = registry.len(), "Registered MCP tools");
    let app = app(&config, registry);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "MCP Server listening on http://{}{}",
        addr,
        config.server.mcp_path
    );
    axum::serve(listener, app).await?;

    Ok(())
}
