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
use clap::Parser;
use ragmetrics_server::{config::ServerConfig, init_tracing, run_server};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "RAGMETRICS_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "RAGMETRICS_HTTP_ADDR")]
    http_addr: Option<String>,

    /// MCP endpoint route (overrides config file)
    #[arg(long, env = "RAGMETRICS_MCP_PATH")]
    mcp_path: Option<String>,

    /// Remote metric server for the workflow tool; repeatable
    #[arg(long = "metric-server-url")]
    metric_server_urls: Vec<String>,

    /// Disable the client cache
    #[arg(long)]
    no_client_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    // Load configuration
    let mut config = ServerConfig::load(args.config)?;

    // Apply CLI overrides
    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(path) = args.mcp_path {
        config.server.mcp_path = path;
    }
    if !args.metric_server_urls.is_empty() {
        config.workflow.metric_server_urls = args.metric_server_urls;
    }
    if args.no_client_cache {
        config.clients.enabled = false;
    }

    run_server(config).await
}
