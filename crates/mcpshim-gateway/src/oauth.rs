//! OAuth callback sub-application
//!
//! An independently authored router handling the authorization-code flow
//! against the configured provider. The shim is a confidential client
//! (it holds its own secret), so the plain code exchange is used.
//!
//! Authored against its own state type and adapted to the parent at
//! mount time; the composer nests it under `/oauth`, making the
//! effective callback path `/oauth/auth/callback`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Json, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use mcpshim_core::{OAuthProviderConfig, OAuthToken, TokenResponse, TokenStore};

/// How long an issued CSRF state stays valid.
const STATE_TTL: Duration = Duration::from_secs(600);

/// State for the OAuth router.
#[derive(Clone)]
pub struct OAuthState {
    provider: OAuthProviderConfig,
    redirect_uri: String,
    token_store: TokenStore,
    http: reqwest::Client,
    /// Issued CSRF states awaiting their callback
    pending: Arc<Mutex<HashMap<String, Instant>>>,
}

impl OAuthState {
    pub fn new(provider: OAuthProviderConfig, redirect_uri: String, token_store: TokenStore) -> Self {
        Self {
            provider,
            redirect_uri,
            token_store,
            http: reqwest::Client::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Build the OAuth sub-router. Routes are relative to the mount prefix.
pub fn router(state: OAuthState) -> Router {
    Router::new()
        .route("/auth", get(auth_start))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/status", get(auth_status))
        .with_state(state)
}

/// Start the authorization flow: record a CSRF state and redirect the
/// browser to the provider.
async fn auth_start(State(state): State<OAuthState>) -> Result<Redirect, (StatusCode, String)> {
    let csrf = generate_state();
    remember_state(&state.pending, csrf.clone());

    let mut url = Url::parse(&state.provider.authorize_url).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("invalid authorize URL: {e}"),
        )
    })?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &state.provider.client_id)
        .append_pair("redirect_uri", &state.redirect_uri)
        .append_pair("state", &csrf);

    info!("starting OAuth authorization flow");
    Ok(Redirect::temporary(url.as_str()))
}

/// Callback parameters from the provider redirect.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchange the authorization code and persist the token.
async fn auth_callback(
    State(state): State<OAuthState>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>, (StatusCode, String)> {
    if let Some(error) = params.error {
        let message = match params.error_description {
            Some(desc) => format!("{error}: {desc}"),
            None => error,
        };
        warn!("authorization denied by provider: {message}");
        return Err((StatusCode::BAD_REQUEST, message));
    }

    let csrf = params
        .state
        .ok_or((StatusCode::BAD_REQUEST, "missing state".to_string()))?;
    if !take_state(&state.pending, &csrf) {
        return Err((
            StatusCode::BAD_REQUEST,
            "unknown or expired state".to_string(),
        ));
    }
    let code = params
        .code
        .ok_or((StatusCode::BAD_REQUEST, "missing code".to_string()))?;

    let token = exchange_code(&state, &code).await.map_err(|e| {
        warn!("token exchange failed: {e}");
        (StatusCode::BAD_GATEWAY, format!("token exchange failed: {e}"))
    })?;

    state.token_store.save(&token).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not persist token: {e}"),
        )
    })?;

    info!(path = %state.token_store.path().display(), "OAuth token persisted");
    Ok(Html(
        "<html><body><h1>Authorization complete</h1>\
         <p>You can close this window.</p></body></html>",
    ))
}

/// Report whether a token is persisted and when it expires.
async fn auth_status(
    State(state): State<OAuthState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let token = state.token_store.load().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not read token store: {e}"),
        )
    })?;

    Ok(Json(match token {
        Some(token) => json!({
            "authorized": true,
            "expired": token.is_expired(),
            "expires_at": token.expires_at,
            "scope": token.scope,
        }),
        None => json!({ "authorized": false }),
    }))
}

/// Exchange an authorization code for tokens at the provider.
async fn exchange_code(state: &OAuthState, code: &str) -> anyhow::Result<OAuthToken> {
    let mut params = HashMap::new();
    params.insert("grant_type", "authorization_code");
    params.insert("code", code);
    params.insert("redirect_uri", &state.redirect_uri);
    params.insert("client_id", &state.provider.client_id);
    params.insert("client_secret", &state.provider.client_secret);

    let response = state
        .http
        .post(&state.provider.token_url)
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {status} - {body}");
    }

    let token_response: TokenResponse = response.json().await?;
    Ok(token_response.into())
}

fn remember_state(pending: &Mutex<HashMap<String, Instant>>, state: String) {
    let mut guard = pending.lock().expect("state lock poisoned");
    let now = Instant::now();
    guard.retain(|_, issued| now.duration_since(*issued) < STATE_TTL);
    guard.insert(state, now);
}

/// Consume a CSRF state. Valid exactly once, within the TTL.
fn take_state(pending: &Mutex<HashMap<String, Instant>>, state: &str) -> bool {
    let mut guard = pending.lock().expect("state lock poisoned");
    match guard.remove(state) {
        Some(issued) => issued.elapsed() < STATE_TTL,
        None => false,
    }
}

/// Generate a random state parameter
fn generate_state() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
