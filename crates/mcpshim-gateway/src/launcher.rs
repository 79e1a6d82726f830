//! Upstream launcher
//!
//! Resolves the upstream MCP server's entry file on the search path,
//! starts it as a child process and performs the MCP handshake over
//! stdio. The resulting [`UpstreamHandle`] is the process-lifetime
//! "loaded unit": created exactly once at startup, never reloaded, and
//! torn down last on shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation, LoggingLevel};
use rmcp::service::{NotificationContext, Peer, RunningService};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use mcpshim_core::{resolve_upstream_file, ResolveError, ShimConfig};

use crate::proxy::{ProxyHandler, UpstreamInfo};

/// Default time allowed for spawn + MCP handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Env var through which the child learns the token file location.
const TOKEN_FILE_ENV: &str = "MCPSHIM_TOKEN_FILE";

/// Env var through which the child learns the derived redirect URI.
const REDIRECT_URI_ENV: &str = "MCPSHIM_REDIRECT_URI";

/// Type alias for the MCP client service talking to the upstream child.
pub type UpstreamClient = RunningService<RoleClient, ShimClientHandler>;

/// Launch failure - always fatal at startup. The process must not come
/// up without a working MCP mount.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to spawn upstream process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP handshake with upstream failed: {0}")]
    Handshake(String),

    #[error("upstream connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Client handler for the upstream connection.
///
/// Re-emits the upstream's `logging` notifications through tracing so
/// child diagnostics end up in the shim's own log stream.
#[derive(Clone, Debug, Default)]
pub struct ShimClientHandler;

impl ShimClientHandler {
    pub fn new() -> Self {
        Self
    }
}

impl rmcp::ClientHandler for ShimClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "mcpshim".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("mcpshim gateway".to_string()),
                ..Default::default()
            },
            meta: None,
        }
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let message = match &params.data {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match params.level {
                LoggingLevel::Debug => debug!(logger = ?params.logger, "[upstream] {message}"),
                LoggingLevel::Info | LoggingLevel::Notice => {
                    info!(logger = ?params.logger, "[upstream] {message}")
                }
                _ => warn!(logger = ?params.logger, "[upstream] {message}"),
            }
        }
    }
}

/// Handle to the running upstream unit.
///
/// Owned for the whole process lifetime; there is no reload path.
#[derive(Debug)]
pub struct UpstreamHandle {
    client: UpstreamClient,
    source: PathBuf,
    command: String,
}

impl UpstreamHandle {
    /// Wrap an already-connected client. The normal path is [`launch`];
    /// this constructor exists so tests can inject an in-process upstream.
    pub fn new(client: UpstreamClient, source: PathBuf, command: String) -> Self {
        Self {
            client,
            source,
            command,
        }
    }

    /// Cloneable request handle to the upstream peer.
    pub fn peer(&self) -> Peer<RoleClient> {
        self.client.peer().clone()
    }

    /// Describe the upstream for introspection, using the identity it
    /// advertised during the handshake.
    pub fn describe(&self) -> UpstreamInfo {
        let (name, version) = match self.client.peer_info() {
            Some(info) => (
                info.server_info.name.to_string(),
                info.server_info.version.to_string(),
            ),
            None => ("unknown".to_string(), "unknown".to_string()),
        };
        UpstreamInfo {
            name,
            version,
            source: self.source.clone(),
            command: self.command.clone(),
        }
    }

    /// Build the proxy handler serving this upstream over HTTP.
    pub fn proxy(&self) -> ProxyHandler {
        let info = self.client.peer_info().cloned();
        ProxyHandler::new(self.peer(), info)
    }

    /// Terminate the upstream connection and, with it, the child process.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.client
            .cancel()
            .await
            .map(drop)
            .map_err(|e| anyhow::anyhow!("upstream shutdown failed: {e}"))
    }
}

/// Resolve, spawn and handshake the upstream MCP server.
///
/// Strictly sequential; any failure aborts startup. `token_file` is the
/// already-resolved token path injected into the child environment so
/// both sides agree on where token state lives.
pub async fn launch(config: &ShimConfig, token_file: &Path) -> Result<UpstreamHandle, LaunchError> {
    let source = resolve_upstream_file(&config.server_file, &config.search_path)?;
    info!(path = %source.display(), "resolved upstream server file");

    let (program, args) = launch_command(config, &source);
    let env = child_env(config, token_file);

    let spawn_args = args.clone();
    let transport = TokioChildProcess::new(Command::new(&program).configure(move |cmd| {
        cmd.args(&spawn_args)
            .envs(&env)
            .stderr(Stdio::piped())
            .kill_on_drop(true);
    }))
    .map_err(|e| LaunchError::Spawn {
        command: program.clone(),
        source: e,
    })?;

    info!(command = %program, args = ?args, "upstream process spawned, starting MCP handshake");

    let connect = ShimClientHandler::new().serve(transport);
    let client = match tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, connect).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => return Err(LaunchError::Handshake(e.to_string())),
        Err(_) => return Err(LaunchError::Timeout(DEFAULT_CONNECT_TIMEOUT)),
    };

    if let Some(peer_info) = client.peer_info() {
        info!(
            upstream = %peer_info.server_info.name,
            version = %peer_info.server_info.version,
            "upstream connected"
        );
    }

    Ok(UpstreamHandle::new(client, source, program))
}

/// Child command: either the configured interpreter with the resolved
/// file as its argument, or the resolved file executed directly.
fn launch_command(config: &ShimConfig, source: &Path) -> (String, Vec<String>) {
    match &config.server_command {
        Some(interpreter) => (
            interpreter.clone(),
            vec![source.display().to_string()],
        ),
        None => (source.display().to_string(), Vec::new()),
    }
}

/// Environment injected into the child: the opaquely forwarded variables
/// plus the token file path and derived redirect URI, so both sides see
/// the same token location and callback address.
fn child_env(config: &ShimConfig, token_file: &Path) -> HashMap<String, String> {
    let mut env = config.forwarded_env.clone();
    env.insert(
        TOKEN_FILE_ENV.to_string(),
        token_file.display().to_string(),
    );
    if let Some(redirect_uri) = &config.redirect_uri {
        env.insert(REDIRECT_URI_ENV.to_string(), redirect_uri.clone());
    }
    env
}
