// ABOUTME: HTTP surface: axum router over the image, proxy and registry operations.
// ABOUTME: Permissive CORS and request tracing wrap every route.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};
pub use handlers::{
    DeleteBody, ProxyCheckBody, PushBody, RegistryCheck, RegistryCheckBody, TagBody,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::proxy::{ProxyChecker, ProxyManager};
use crate::runtime::{EngineConnector, LocalConnector};

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn EngineConnector>,
    pub proxy: Arc<ProxyManager>,
    pub checker: Arc<ProxyChecker>,
    pub registry_server: Arc<String>,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn EngineConnector>,
        proxy: ProxyManager,
        registry_server: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            proxy: Arc::new(proxy),
            checker: Arc::new(ProxyChecker::default()),
            registry_server: Arc::new(registry_server.into()),
        }
    }

    pub fn with_checker(mut self, checker: ProxyChecker) -> Self {
        self.checker = Arc::new(checker);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(LocalConnector::new(config.engine.clone())),
            config.proxy.manager(),
            config.registry.server.clone(),
        )
        .with_checker(config.proxy.checker())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/images", get(handlers::list))
        .route("/images/delete", post(handlers::delete))
        .route("/images/push", post(handlers::push))
        .route("/images/tag", post(handlers::tag))
        .route("/images/untag", post(handlers::untag))
        .route("/proxy/check", post(handlers::check_proxy))
        .route("/registry/check", post(handlers::check_registry))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `config.listen` until interrupted.
pub async fn serve(config: &Config) -> Result<()> {
    let addr = config.listen;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;

    tracing::info!(%addr, "Server starting");
    axum::serve(listener, router(AppState::from_config(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
