// ABOUTME: Wire-level OIDC data structures - requests, responses, grants, protocol errors
// ABOUTME: Serialization shapes here are the protocol surface relying parties see
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! OIDC wire types
//!
//! Protocol errors deliberately omit `error_description` on credential and
//! grant failures so responses cannot be used to enumerate which check
//! failed.

use crate::errors::AppError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A validated authorization request, parked in the session during login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: String,
    pub code_challenge: String,
    /// Always a concrete method; an omitted parameter was defaulted to S256
    pub code_challenge_method: String,
}

/// Server-side record behind an issued authorization code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub user_id: Uuid,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Server-side record behind an issued access token
#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Parsed token endpoint request (form-encoded)
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub code_verifier: String,
    /// Accepted for client_secret_post compatibility, never checked:
    /// these are public clients and PKCE is the proof of possession
    pub client_secret: Option<String>,
}

/// Successful token endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub expires_in: i64,
    pub access_token: String,
    pub id_token: String,
    pub scope: String,
}

/// ID token claim set (RS256 signed)
#[derive(Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Userinfo endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub email_verified: bool,
}

/// Login form credentials
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Outcome of starting an authorization request
#[derive(Debug)]
pub enum BeginOutcome {
    /// No authenticated user in the session; render the login form
    LoginRequired,
    /// User already authenticated; redirect with a fresh code
    Redirect(String),
}

/// Login failures, distinguished internally but uniform on the wire
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("no pending authorization request in session")]
    MissingPendingRequest,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] AppError),
}

/// OAuth/OIDC protocol error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorKind {
    InvalidRequest,
    UnsupportedGrantType,
    InvalidClient,
    InvalidGrant,
    InvalidToken,
    InvalidKey,
    ServerError,
}

/// An OAuth/OIDC wire error
///
/// Serializes as `{"error": "...", "error_description": "..."}` with the
/// description omitted when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolError {
    pub error: ProtocolErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ProtocolError {
    /// Malformed or unacceptable request parameters
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            error: ProtocolErrorKind::InvalidRequest,
            error_description: Some(description.into()),
        }
    }

    /// Grant type other than authorization_code
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self {
            error: ProtocolErrorKind::UnsupportedGrantType,
            error_description: Some(description.into()),
        }
    }

    /// Unknown client at the token endpoint; no description by design
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: ProtocolErrorKind::InvalidClient,
            error_description: None,
        }
    }

    /// Bad, expired, replayed, or mismatched grant; no description so the
    /// response does not say which check failed
    #[must_use]
    pub fn invalid_grant() -> Self {
        Self {
            error: ProtocolErrorKind::InvalidGrant,
            error_description: None,
        }
    }

    /// Missing, unknown, or expired bearer token
    #[must_use]
    pub fn invalid_token() -> Self {
        Self {
            error: ProtocolErrorKind::InvalidToken,
            error_description: None,
        }
    }

    /// Key material failure while building the JWKS
    #[must_use]
    pub fn invalid_key() -> Self {
        Self {
            error: ProtocolErrorKind::InvalidKey,
            error_description: None,
        }
    }

    /// Internal failure surfaced on the protocol wire
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: ProtocolErrorKind::ServerError,
            error_description: None,
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> http::StatusCode {
        match self.error {
            ProtocolErrorKind::InvalidToken => http::StatusCode::UNAUTHORIZED,
            ProtocolErrorKind::InvalidKey | ProtocolErrorKind::ServerError => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
