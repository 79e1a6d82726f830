//! # mcpshim Core Library
//!
//! Deployment-shim building blocks with no HTTP or MCP dependencies.
//!
//! ## Modules
//!
//! - `config` - Environment-derived, immutable shim configuration
//! - `resolve` - Search-path resolution of upstream files
//! - `token` - OAuth token model and file-backed persistence

pub mod config;
pub mod resolve;
pub mod token;

// Re-export commonly used types
pub use config::{derive_redirect_uri, OAuthProviderConfig, ShimConfig, CALLBACK_SUFFIX};
pub use resolve::{resolve_upstream_file, ResolveError, FALLBACK_SUBDIR};
pub use token::{OAuthToken, TokenResponse, TokenStore};
