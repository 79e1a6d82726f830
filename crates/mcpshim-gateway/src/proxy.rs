//! MCP proxy handler
//!
//! Implements the MCP ServerHandler trait by delegating every request
//! verbatim to the upstream peer. This is the single canonical entry
//! point between the HTTP mount and the upstream unit - there is no
//! factory probing and no alternative calling convention.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    model::*,
    service::{Peer, RequestContext},
    ErrorData as McpError, RoleClient, RoleServer, ServerHandler,
};
use tracing::{debug, info};

/// Identity of the running upstream, for operational introspection.
#[derive(Debug, Clone)]
pub struct UpstreamInfo {
    /// Implementation name the upstream advertised during the handshake
    pub name: String,
    /// Implementation version the upstream advertised
    pub version: String,
    /// Resolved entry file
    pub source: PathBuf,
    /// Command used to launch it
    pub command: String,
}

/// Delegating MCP handler: one instance per HTTP session, all sharing
/// the same upstream peer.
#[derive(Clone)]
pub struct ProxyHandler {
    peer: Peer<RoleClient>,
    /// What the upstream advertised at handshake time; used to mirror
    /// its capabilities and instructions to downstream clients.
    upstream: Option<Arc<InitializeResult>>,
}

impl ProxyHandler {
    pub fn new(peer: Peer<RoleClient>, upstream: Option<InitializeResult>) -> Self {
        Self {
            peer,
            upstream: upstream.map(Arc::new),
        }
    }

    fn capabilities(&self) -> ServerCapabilities {
        match &self.upstream {
            Some(info) => info.capabilities.clone(),
            None => ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability {
                    list_changed: Some(false),
                })
                .enable_prompts_with(PromptsCapability {
                    list_changed: Some(false),
                })
                .enable_resources_with(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(false),
                })
                .build(),
        }
    }
}

fn proxy_error(operation: &str, error: impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("upstream {operation} failed: {error}"), None)
}

impl ServerHandler for ProxyHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: "mcpshim".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: self
                .upstream
                .as_ref()
                .and_then(|info| info.instructions.clone()),
        }
    }

    async fn list_tools(
        &self,
        params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let result = self
            .peer
            .list_tools(params)
            .await
            .map_err(|e| proxy_error("list_tools", e))?;
        debug!(count = result.tools.len(), "list_tools");
        Ok(result)
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(tool = %params.name, "call_tool");
        self.peer
            .call_tool(params)
            .await
            .map_err(|e| proxy_error("call_tool", e))
    }

    async fn list_prompts(
        &self,
        params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let result = self
            .peer
            .list_prompts(params)
            .await
            .map_err(|e| proxy_error("list_prompts", e))?;
        debug!(count = result.prompts.len(), "list_prompts");
        Ok(result)
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        self.peer
            .get_prompt(params)
            .await
            .map_err(|e| proxy_error("get_prompt", e))
    }

    async fn list_resources(
        &self,
        params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let result = self
            .peer
            .list_resources(params)
            .await
            .map_err(|e| proxy_error("list_resources", e))?;
        debug!(count = result.resources.len(), "list_resources");
        Ok(result)
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.peer
            .read_resource(params)
            .await
            .map_err(|e| proxy_error("read_resource", e))
    }
}
