//! mcpshim Gateway
//!
//! Composes one HTTP service out of two independently authored parts: the
//! upstream MCP server (launched as a child process and proxied over
//! Streamable HTTP) and an optional OAuth callback sub-application.
//! The gateway owns only glue: resolution, launch, composition, and
//! lifecycle - all tool logic belongs to the upstream program.

pub mod launcher;
pub mod oauth;
pub mod proxy;
pub mod server;

pub use launcher::{launch, LaunchError, ShimClientHandler, UpstreamHandle};
pub use oauth::OAuthState;
pub use proxy::{ProxyHandler, UpstreamInfo};
pub use server::{build_router, AppState, GatewayServer};
