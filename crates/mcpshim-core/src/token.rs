//! OAuth token model and file-backed persistence
//!
//! The token file is the only state shared between the shim and the
//! upstream child process: the shim's OAuth callback writes it, the child
//! reads it (via the injected `MCPSHIM_TOKEN_FILE` path). Tokens must
//! survive restarts, so the store lives on a mounted volume in container
//! deployments.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Persisted OAuth token state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Access token for API calls
    pub access_token: String,

    /// Token type (usually "Bearer")
    pub token_type: String,

    /// Refresh token for getting new access tokens
    pub refresh_token: Option<String>,

    /// Token expiry time
    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted
    #[serde(default)]
    pub scope: Option<String>,
}

/// Wire response from an OAuth token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

impl From<TokenResponse> for OAuthToken {
    fn from(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            expires_at,
            scope: response.scope,
        }
    }
}

impl OAuthToken {
    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false, // No expiry = never expires
        }
    }

}

/// File-backed token store at a configured location.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Prepare a store at `dir/filename`, creating the directory.
    ///
    /// Directory creation failure is non-fatal: the store falls back to
    /// the bare filename relative to the working directory, which matches
    /// the upstream default location. The operator may then believe tokens
    /// persist to the configured volume when they do not, so the fallback
    /// is logged loudly.
    pub fn prepare(dir: &Path, filename: &str) -> Self {
        match std::fs::create_dir_all(dir) {
            Ok(()) => Self {
                path: dir.join(filename),
            },
            Err(e) => {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "could not create token directory; falling back to the working directory"
                );
                Self {
                    path: PathBuf::from(filename),
                }
            }
        }
    }

    /// Open a store at an exact path without touching the filesystem.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted token, if any. A missing file is `Ok(None)`;
    /// an unreadable or malformed file is an error.
    pub async fn load(&self) -> Result<Option<OAuthToken>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).context(format!("reading token file {}", self.path.display()))
            }
        };
        let token = serde_json::from_slice(&raw)
            .context(format!("parsing token file {}", self.path.display()))?;
        Ok(Some(token))
    }

    /// Persist a token, replacing any previous one.
    ///
    /// Writes to a temp file next to the target and renames it over, so a
    /// crash mid-write never leaves a truncated token file behind.
    pub async fn save(&self, token: &OAuthToken) -> Result<()> {
        let raw = serde_json::to_vec_pretty(token)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &raw)
            .await
            .context(format!("writing token file {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .context(format!("replacing token file {}", self.path.display()))?;
        Ok(())
    }
}
