// ABOUTME: OIDC protocol module - wire types and the authorization/token engine
// ABOUTME: HTTP handlers in routes::oidc are thin adapters over this module
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! OIDC protocol implementation
//!
//! [`models`] holds the wire-level request/response/error types;
//! [`endpoints`] holds the [`endpoints::AuthorizationServer`] engine that
//! implements the Authorization Code flow with PKCE.

pub mod endpoints;
pub mod models;

pub use endpoints::AuthorizationServer;
