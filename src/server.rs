// ABOUTME: Server resource wiring and HTTP serving loop
// ABOUTME: All shared state is constructed once here and handed to the router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Server assembly
//!
//! [`ServerResources`] wires the engine to its stores and collaborators.
//! Construct it once at startup; everything downstream shares it through
//! an `Arc`.

use crate::clients::ClientRegistry;
use crate::config::ServerConfig;
use crate::keys::SigningKey;
use crate::oidc::models::{AccessTokenRecord, AuthorizationCode};
use crate::oidc::AuthorizationServer;
use crate::session::SessionManager;
use crate::store::{StoreConfig, TtlStore};
use crate::users::UserDirectory;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Shared state behind every HTTP handler
pub struct ServerResources {
    pub config: Arc<ServerConfig>,
    pub signing_key: Arc<SigningKey>,
    pub sessions: SessionManager,
    pub codes: TtlStore<AuthorizationCode>,
    pub access_tokens: TtlStore<AccessTokenRecord>,
    pub engine: AuthorizationServer,
}

impl ServerResources {
    /// Wire up all shared state
    ///
    /// Must run inside a tokio runtime when `store_config` enables
    /// background cleanup.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        signing_key: SigningKey,
        users: Arc<dyn UserDirectory>,
        store_config: &StoreConfig,
    ) -> Self {
        let config = Arc::new(config);
        let signing_key = Arc::new(signing_key);

        let sessions = SessionManager::new(store_config, config.session_ttl_secs);
        let codes: TtlStore<AuthorizationCode> = TtlStore::new(store_config);
        let access_tokens: TtlStore<AccessTokenRecord> = TtlStore::new(store_config);

        let registry = ClientRegistry::from_config(&config.clients);
        let engine = AuthorizationServer::new(
            Arc::clone(&config),
            Arc::clone(&signing_key),
            registry,
            users,
            codes.clone(),
            access_tokens.clone(),
        );

        Self {
            config,
            signing_key,
            sessions,
            codes,
            access_tokens,
            engine,
        }
    }

    /// Bind the listener and serve until shutdown
    ///
    /// # Errors
    /// Returns an error if the port cannot be bound or the server fails.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!("identity provider listening on {}", addr);

        let app = crate::routes::router(self);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")
    }
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
