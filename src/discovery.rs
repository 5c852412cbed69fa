// ABOUTME: OIDC discovery metadata and JWKS document construction
// ABOUTME: Both documents are pure functions of startup configuration
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Discovery publication
//!
//! The discovery document and the JWKS it points at are derived entirely
//! from startup configuration. Endpoint URLs are built from the configured
//! issuer so relying parties reach the provider at the address tokens claim.

use crate::config::ServerConfig;
use crate::errors::AppResult;
use crate::keys::{JsonWebKeySet, SigningKey};
use serde_json::{json, Value};

/// Build the OIDC discovery document
#[must_use]
pub fn discovery_document(config: &ServerConfig) -> Value {
    let issuer = &config.issuer;

    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oidc/authorize"),
        "token_endpoint": format!("{issuer}/oidc/token"),
        "userinfo_endpoint": format!("{issuer}/oidc/userinfo"),
        "jwks_uri": format!("{issuer}/oidc/jwks.json"),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": config.default_scopes,
        "token_endpoint_auth_methods_supported": ["none", "client_secret_post"],
        "grant_types_supported": ["authorization_code"],
        "code_challenge_methods_supported": ["S256"],
    })
}

/// Build the published key set (one signing key, public half only)
///
/// # Errors
/// Returns `KeyMaterial` if the key cannot be rendered as a JWK
pub fn jwks_document(key: &SigningKey) -> AppResult<JsonWebKeySet> {
    Ok(JsonWebKeySet {
        keys: vec![key.public_jwk()?],
    })
}
