//! Shim configuration
//!
//! All configuration is read from environment variables exactly once at
//! startup into an immutable [`ShimConfig`]. The redirect URI is derived
//! here so every downstream consumer (the OAuth router and the upstream
//! child process) sees a single source of truth.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::warn;

/// Callback suffix appended to the public base URL. The OAuth router
/// defines its callback at `/auth/callback` and is mounted at `/oauth`,
/// so the effective path is `/oauth/auth/callback`.
pub const CALLBACK_SUFFIX: &str = "/oauth/auth/callback";

/// Default listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

const DEFAULT_TOKEN_FILENAME: &str = "oauth_tokens.json";

/// Environment variables forwarded opaquely to the upstream child process.
const FORWARDED_VARS: &[&str] = &[
    "MCPSHIM_CLIENT_ID",
    "MCPSHIM_CLIENT_SECRET",
    "MCPSHIM_ACCOUNT_ID",
    "MCPSHIM_USER_AGENT",
];

/// OAuth provider settings. The OAuth sub-application is only mounted
/// when all of these are configured.
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
}

/// Immutable shim configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ShimConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS for browser access
    pub enable_cors: bool,
    /// Ordered search roots for upstream files (earlier entries win)
    pub search_path: Vec<PathBuf>,
    /// Filename of the upstream MCP server entry point
    pub server_file: String,
    /// Optional interpreter/launcher for the resolved file
    pub server_command: Option<String>,
    /// Public base URL of this deployment, if any
    pub public_base_url: Option<String>,
    /// Redirect URI (explicit override or derived from the base URL)
    pub redirect_uri: Option<String>,
    /// Directory holding the persisted token file
    pub token_dir: PathBuf,
    /// Token file name inside `token_dir`
    pub token_filename: String,
    /// OAuth provider settings, when fully configured
    pub oauth: Option<OAuthProviderConfig>,
    /// Environment forwarded opaquely to the upstream child process
    pub forwarded_env: HashMap<String, String>,
}

impl ShimConfig {
    /// Read configuration from the process environment.
    ///
    /// Fails when `MCPSHIM_SERVER_FILE` is missing or the bind address is
    /// unparseable - the process must not come up partially configured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("PORT is not a valid port number: {raw}"))?,
            None => DEFAULT_PORT,
        };
        if format!("{}:{}", host, port).parse::<SocketAddr>().is_err() {
            bail!("invalid bind address {host}:{port}");
        }

        let Some(server_file) = get("MCPSHIM_SERVER_FILE") else {
            bail!("MCPSHIM_SERVER_FILE is required; set it to the upstream server's entry file");
        };

        let search_path = match get("MCPSHIM_SEARCH_PATH") {
            Some(raw) => std::env::split_paths(&raw).collect(),
            None => vec![PathBuf::from(".")],
        };

        let public_base_url = get("PUBLIC_BASE_URL");
        let redirect_uri = derive_redirect_uri(
            get("MCPSHIM_REDIRECT_URI").as_deref(),
            public_base_url.as_deref(),
        );

        let token_dir = get("TOKEN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_token_dir);
        let token_filename =
            get("TOKEN_FILENAME").unwrap_or_else(|| DEFAULT_TOKEN_FILENAME.to_string());

        let oauth = build_oauth_config(&get, redirect_uri.as_deref());

        let mut forwarded_env = HashMap::new();
        for key in FORWARDED_VARS {
            if let Some(value) = get(key) {
                forwarded_env.insert(key.to_string(), value);
            }
        }

        Ok(Self {
            host,
            port,
            enable_cors: get("MCPSHIM_CORS").map(|v| v != "0").unwrap_or(true),
            search_path,
            server_file,
            server_command: get("MCPSHIM_SERVER_COMMAND"),
            public_base_url,
            redirect_uri,
            token_dir,
            token_filename,
            oauth,
            forwarded_env,
        })
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("validated at construction")
    }

    /// Base URL of this deployment. Prefers the configured public URL so
    /// derived links survive a reverse proxy.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    /// Full path of the token persistence file.
    pub fn token_path(&self) -> PathBuf {
        self.token_dir.join(&self.token_filename)
    }
}

/// Derive the OAuth redirect URI.
///
/// An explicit override is left untouched regardless of the base URL.
/// Otherwise the callback suffix is appended to the base URL with trailing
/// slashes stripped. No base URL means no redirect URI.
pub fn derive_redirect_uri(explicit: Option<&str>, public_base: Option<&str>) -> Option<String> {
    if let Some(uri) = explicit {
        return Some(uri.to_string());
    }
    let base = public_base?;
    Some(format!("{}{}", base.trim_end_matches('/'), CALLBACK_SUFFIX))
}

fn build_oauth_config<F>(get: &F, redirect_uri: Option<&str>) -> Option<OAuthProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = get("MCPSHIM_CLIENT_ID");
    let client_secret = get("MCPSHIM_CLIENT_SECRET");
    let authorize_url = get("MCPSHIM_AUTHORIZE_URL");
    let token_url = get("MCPSHIM_TOKEN_URL");

    match (client_id, client_secret, authorize_url, token_url) {
        (Some(client_id), Some(client_secret), Some(authorize_url), Some(token_url)) => {
            if redirect_uri.is_none() {
                warn!("OAuth credentials configured but no redirect URI could be derived; set PUBLIC_BASE_URL or MCPSHIM_REDIRECT_URI");
                return None;
            }
            Some(OAuthProviderConfig {
                client_id,
                client_secret,
                authorize_url,
                token_url,
            })
        }
        (None, None, None, None) => None,
        _ => {
            // Partial credentials are treated as absent, not fatal: OAuth
            // support is optional and MCP serving must still come up.
            warn!("incomplete OAuth configuration; the /oauth routes will not be mounted");
            None
        }
    }
}

/// Default token directory: the container volume path if it exists,
/// otherwise the platform data dir, otherwise `./data`.
fn default_token_dir() -> PathBuf {
    let container_default = PathBuf::from("/app/data");
    if container_default.parent().map(Path::is_dir).unwrap_or(false) {
        return container_default;
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("mcpshim"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
