//! mcpshim binary
//!
//! Thin entry point: parse flags, initialize tracing, read the
//! environment configuration and hand off to the gateway.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcpshim_core::ShimConfig;
use mcpshim_gateway::GatewayServer;

/// Deployment shim wrapping a stdio MCP server as a Streamable HTTP service.
#[derive(Debug, Parser)]
#[command(name = "mcpshim", version, about)]
struct Cli {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing() {
    // RUST_LOG takes precedence, with sensible defaults for our crates.
    // Note: crate names use underscores in tracing (mcpshim-core → mcpshim_core)
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("mcpshim_core=debug".parse().unwrap())
            .add_directive("mcpshim_gateway=debug".parse().unwrap())
            .add_directive("tower_http=info".parse().unwrap())
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = ShimConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if format!("{}:{}", config.host, config.port)
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        anyhow::bail!("invalid bind address {}:{}", config.host, config.port);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.addr(),
        "starting mcpshim"
    );

    GatewayServer::new(config).run().await
}
