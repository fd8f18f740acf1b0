//! # quillbin-server: HTTP front end for quillbin-core
//!
//! A thin axum adapter: every route maps to one `DocumentService` call.
//!
//! ```text
//! request ─► SetRequestId ─► Timeout ─► log ─► handler ─► spawn_blocking
//!                                                             │
//!                                                   DocumentService (core)
//! ```
//!
//! A background task sweeps expired versions and idle rate-limit buckets.

pub mod config;
pub mod error;
pub mod handlers;
pub mod labels;
pub mod maintenance;
pub mod middleware;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use quillbin_core::{DocumentService, DocumentStore};
use tokio::net::TcpListener;

pub use config::Config;
pub use error::{ApiError, ServerError};
pub use routes::AppState;

/// Version string reported by `/version`.
pub fn build_version() -> String {
    format!("quillbin {}", env!("CARGO_PKG_VERSION"))
}

/// The HTTP server.
pub struct Server {
    config: Config,
    service: Arc<DocumentService>,
}

impl Server {
    /// Open the store and build the service. Fails on an empty secret.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config.validate()?;
        let store = DocumentStore::open(config.store_config()).map_err(quillbin_core::Error::from)?;
        let service = DocumentService::new(store, config.service_config())?;
        Ok(Self::with_service(config, Arc::new(service)))
    }

    /// Wrap an already-built service.
    pub fn with_service(config: Config, service: Arc<DocumentService>) -> Self {
        Self { config, service }
    }

    pub fn service(&self) -> &Arc<DocumentService> {
        &self.service
    }

    pub fn router(&self) -> Router {
        routes::router(
            AppState::new(self.service.clone()),
            self.config.request_timeout(),
            self.config.body_limit(),
        )
    }

    /// Bind, serve until ctrl-c, then flush the store.
    pub async fn run(&self) -> Result<(), ServerError> {
        let maintenance = maintenance::spawn(
            self.service.clone(),
            self.config.cleanup_interval(),
            self.config.expire_after(),
        );

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        log::info!("Listening on {}", self.config.listen_addr);

        axum::serve(
            listener,
            self.router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        maintenance.abort();
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || service.store().sync())
            .await
            .map_err(std::io::Error::other)?
            .map_err(quillbin_core::Error::from)?;
        log::info!("Shut down cleanly");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
