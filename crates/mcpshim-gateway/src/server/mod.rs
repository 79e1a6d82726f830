//! Gateway server
//!
//! Composes the health/introspection routes, the Streamable HTTP MCP
//! mount and the optional OAuth mount into one axum application, and
//! owns the startup/shutdown sequence around it.

mod handlers;

pub use handlers::AppState;

use std::sync::Arc;

use axum::{routing::get, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use mcpshim_core::{ShimConfig, TokenStore};

use crate::launcher;
use crate::oauth::{self, OAuthState};
use crate::proxy::ProxyHandler;

/// The deployment gateway.
///
/// Startup is strictly sequential: resolve, launch, configure, compose,
/// bind. Each stage's failure aborts all later stages - the process
/// never comes up partially configured.
pub struct GatewayServer {
    config: ShimConfig,
}

impl GatewayServer {
    pub fn new(config: ShimConfig) -> Self {
        Self { config }
    }

    /// Run the gateway until a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.addr();

        let token_store = TokenStore::prepare(&self.config.token_dir, &self.config.token_filename);
        info!(token_file = %token_store.path().display(), "token storage configured");

        // Fatal on any failure: without the MCP mount there is nothing
        // worth serving.
        let upstream = launcher::launch(&self.config, token_store.path()).await?;
        let upstream_info = Arc::new(upstream.describe());

        // Optional component: absence degrades to MCP-only serving.
        let oauth_router = match (&self.config.oauth, &self.config.redirect_uri) {
            (Some(provider), Some(redirect_uri)) => {
                info!(redirect_uri = %redirect_uri, "OAuth component enabled");
                Some(oauth::router(OAuthState::new(
                    provider.clone(),
                    redirect_uri.clone(),
                    token_store.clone(),
                )))
            }
            _ => {
                warn!("OAuth component not configured; /oauth routes disabled");
                None
            }
        };

        let app_state = AppState {
            upstream: upstream_info.clone(),
            oauth_enabled: oauth_router.is_some(),
            base_url: self.config.base_url(),
        };

        let session_ct = CancellationToken::new();
        let router = build_router(
            upstream.proxy(),
            app_state,
            oauth_router,
            session_ct.child_token(),
            self.config.enable_cors,
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            upstream = %upstream_info.name,
            "gateway ready"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Release in reverse dependency order: HTTP sessions first, then
        // the upstream child.
        session_ct.cancel();
        if let Err(e) = upstream.shutdown().await {
            warn!("{e}");
        }
        info!("gateway stopped");
        Ok(())
    }
}

/// Compose the parent application.
///
/// The shim's own exact routes are registered before any sub-application
/// is mounted so they cannot be shadowed by a mount. Mounting happens
/// exactly once, at startup.
pub fn build_router(
    handler: ProxyHandler,
    app_state: AppState,
    oauth: Option<Router>,
    cancellation_token: CancellationToken,
    enable_cors: bool,
) -> Router {
    let mcp_service = StreamableHttpService::new(
        move || {
            debug!("creating proxy handler for MCP session");
            Ok(handler.clone())
        },
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(std::time::Duration::from_secs(30)),
            sse_retry: Some(std::time::Duration::from_secs(3)),
            cancellation_token,
        },
    );

    // Own routes first, mounts after.
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/debug/info", get(handlers::debug_info))
        .with_state(app_state)
        .nest_service("/mcp", mcp_service);

    if let Some(oauth) = oauth {
        router = router.nest("/oauth", oauth);
    }

    let mut router = router.layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
}

/// Resolves when the process receives ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
