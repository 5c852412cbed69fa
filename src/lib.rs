// ABOUTME: Minimal OIDC identity provider - Authorization Code flow with PKCE
// ABOUTME: Library root wiring the protocol engine, stores, and HTTP surface
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # OIDC Provider
//!
//! A minimal OpenID Connect identity provider implementing the
//! Authorization Code flow with mandatory PKCE (S256). Designed for demo
//! and integration-test deployments: static client registry, seeded user
//! directory, in-memory grant stores, a single RS256 signing key.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Static relying-party registry
pub mod clients;
/// Environment-based server configuration
pub mod config;
/// OIDC discovery and JWKS documents
pub mod discovery;
/// Unified application error handling
pub mod errors;
/// RSA signing key material and randomness
pub mod keys;
/// Structured logging setup
pub mod logging;
/// OIDC protocol types and engine
pub mod oidc;
/// PKCE S256 verification
pub mod pkce;
/// HTTP route handlers
pub mod routes;
/// Server resource wiring
pub mod server;
/// Cookie-backed browser sessions
pub mod session;
/// Ephemeral TTL grant store
pub mod store;
/// User directory and password verification
pub mod users;
