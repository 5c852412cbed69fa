// ABOUTME: Route module organization for the identity provider HTTP surface
// ABOUTME: Route definitions and thin handlers; protocol decisions live in the oidc module
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! HTTP routes
//!
//! Handlers translate HTTP in and out and delegate every protocol decision
//! to [`crate::oidc::AuthorizationServer`].

/// Health check and system status routes
pub mod health;
/// OIDC protocol routes (authorize, token, userinfo, discovery, JWKS)
pub mod oidc;

use crate::server::ServerResources;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Assemble the full application router
#[must_use]
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(oidc::discovery_handler),
        )
        .route("/oidc/jwks.json", get(oidc::jwks_handler))
        .route(
            "/oidc/authorize",
            get(oidc::authorize_handler).post(oidc::login_handler),
        )
        .route("/oidc/token", post(oidc::token_handler))
        .route("/oidc/userinfo", get(oidc::userinfo_handler))
        .route("/health", get(health::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(resources)
}
