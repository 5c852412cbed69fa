// ABOUTME: Authorization and token engine - code issuance, redemption, bearer lookup
// ABOUTME: Owns every protocol decision; HTTP handlers only translate in and out
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Authorization Code flow engine
//!
//! Codes are single-use: redemption pulls the record out of the store
//! atomically, so a replay or a concurrent second redemption sees nothing.
//! A code consumed by a failed PKCE check stays consumed. Grant failures
//! all collapse to `invalid_grant` with no description.

use crate::clients::ClientRegistry;
use crate::config::ServerConfig;
use crate::errors::AppError;
use crate::keys::{random_hex, SigningKey};
use crate::oidc::models::{
    AccessTokenRecord, AuthenticationError, AuthorizationCode, AuthorizationRequest, BeginOutcome,
    Credentials, IdTokenClaims, ProtocolError, TokenRequest, TokenResponse, UserInfoResponse,
};
use crate::pkce;
use crate::session::SessionData;
use crate::store::TtlStore;
use crate::users::{self, User, UserDirectory, INVALID_PASSWORD_HASH};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, Header};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Authorization code entropy in bytes (256 bits)
const CODE_BYTES: usize = 32;
/// Access token entropy in bytes (320 bits)
const ACCESS_TOKEN_BYTES: usize = 40;

/// The OIDC authorization server engine
#[derive(Clone)]
pub struct AuthorizationServer {
    config: Arc<ServerConfig>,
    signing_key: Arc<SigningKey>,
    registry: ClientRegistry,
    users: Arc<dyn UserDirectory>,
    codes: TtlStore<AuthorizationCode>,
    access_tokens: TtlStore<AccessTokenRecord>,
}

impl AuthorizationServer {
    /// Wire the engine to its stores and collaborators
    #[must_use]
    pub fn new(
        config: Arc<ServerConfig>,
        signing_key: Arc<SigningKey>,
        registry: ClientRegistry,
        users: Arc<dyn UserDirectory>,
        codes: TtlStore<AuthorizationCode>,
        access_tokens: TtlStore<AccessTokenRecord>,
    ) -> Self {
        Self {
            config,
            signing_key,
            registry,
            users,
            codes,
            access_tokens,
        }
    }

    /// Validate raw authorize query parameters into a typed request
    ///
    /// Validation failures here render as JSON errors rather than redirects
    /// because the redirect URI itself is among the things being validated.
    ///
    /// # Errors
    /// Returns `invalid_request` naming the first failed check.
    pub fn validate_authorize_request(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<AuthorizationRequest, ProtocolError> {
        let client_id = require_param(params, "client_id")?;
        let redirect_uri = require_param(params, "redirect_uri")?;
        let response_type = require_param(params, "response_type")?;
        let scope = require_param(params, "scope")?;
        let state = require_param(params, "state")?;
        let code_challenge = require_param(params, "code_challenge")?;

        if response_type != "code" {
            return Err(ProtocolError::invalid_request(
                "Only response_type=code is supported",
            ));
        }

        let Some(client) = self.registry.lookup(client_id) else {
            return Err(ProtocolError::invalid_request("Unknown client"));
        };

        if client.redirect_uri != redirect_uri {
            return Err(ProtocolError::invalid_request("Invalid redirect_uri"));
        }

        // Registered URIs come from config and must be absolute; a relative
        // value cannot host a code delivery
        let parsed = Url::parse(redirect_uri)
            .map_err(|_| ProtocolError::invalid_request("Invalid redirect_uri"))?;
        if parsed.cannot_be_a_base() {
            return Err(ProtocolError::invalid_request("Invalid redirect_uri"));
        }

        // An omitted method means S256, never "no PKCE"
        let code_challenge_method = match params.get("code_challenge_method").map(String::as_str) {
            None | Some(pkce::METHOD_S256) => pkce::METHOD_S256.to_owned(),
            Some(_) => {
                return Err(ProtocolError::invalid_request(
                    "Only code_challenge_method=S256 is supported",
                ));
            }
        };

        let scopes: Vec<String> = scope.split_whitespace().map(ToOwned::to_owned).collect();

        Ok(AuthorizationRequest {
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            scopes,
            state: state.to_owned(),
            code_challenge: code_challenge.to_owned(),
            code_challenge_method,
        })
    }

    /// Start an authorization: redirect immediately if the session is
    /// already authenticated, otherwise park the request for the login form
    ///
    /// # Errors
    /// Returns `server_error` if code minting fails.
    pub async fn begin_authorization(
        &self,
        request: AuthorizationRequest,
        session: &mut SessionData,
    ) -> Result<BeginOutcome, ProtocolError> {
        if let Some(user_id) = session.user_id {
            if self.users.find_by_id(user_id).await.is_some() {
                let location = self.issue_code(user_id, &request).await?;
                return Ok(BeginOutcome::Redirect(location));
            }
            // Session references a vanished user; force re-authentication
            session.user_id = None;
        }

        session.pending_request = Some(request);
        Ok(BeginOutcome::LoginRequired)
    }

    /// Authenticate login credentials against the pending request
    ///
    /// Exactly one bcrypt verification runs regardless of whether the email
    /// exists, so the failure path has uniform timing.
    ///
    /// # Errors
    /// `MissingPendingRequest` when the session carries no parked request,
    /// `InvalidCredentials` on any email/password mismatch.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        session: &mut SessionData,
    ) -> Result<String, AuthenticationError> {
        let Some(request) = session.pending_request.clone() else {
            return Err(AuthenticationError::MissingPendingRequest);
        };

        let user = self.users.find_by_email(&credentials.email).await;
        let hash = user
            .as_ref()
            .map_or(INVALID_PASSWORD_HASH, |u| u.password_hash.as_str());

        let password_ok = users::verify_password(&credentials.password, hash).await?;

        let Some(user) = user.filter(|_| password_ok) else {
            debug!("login failed for client {}", request.client_id);
            return Err(AuthenticationError::InvalidCredentials);
        };

        session.user_id = Some(user.id);
        session.pending_request = None;

        let location = self
            .issue_code(user.id, &request)
            .await
            .map_err(|_| AuthenticationError::Internal(AppError::internal("code issuance failed")))?;

        info!(client_id = %request.client_id, "user authenticated, authorization code issued");
        Ok(location)
    }

    /// Redeem an authorization code for tokens
    ///
    /// The code is consumed before any check that could fail, so a second
    /// attempt with the same code always gets `invalid_grant` no matter how
    /// the first one ended.
    ///
    /// # Errors
    /// Protocol errors per check; grant failures carry no description.
    pub async fn redeem_code(&self, request: &TokenRequest) -> Result<TokenResponse, ProtocolError> {
        if request.grant_type != "authorization_code" {
            return Err(ProtocolError::unsupported_grant_type(
                "Only authorization_code is supported",
            ));
        }

        let Some(grant) = self.codes.pull(&request.code).await else {
            debug!("token request with unknown or consumed code");
            return Err(ProtocolError::invalid_grant());
        };

        let Some(client) = self.registry.lookup(&request.client_id) else {
            return Err(ProtocolError::invalid_client());
        };

        if grant.client_id != client.client_id
            || grant.redirect_uri != request.redirect_uri
            || client.redirect_uri != request.redirect_uri
        {
            return Err(ProtocolError::invalid_grant());
        }

        if !pkce::verify(
            &grant.code_challenge,
            &grant.code_challenge_method,
            &request.code_verifier,
        ) {
            warn!(client_id = %request.client_id, "PKCE verification failed, code consumed");
            return Err(ProtocolError::invalid_grant());
        }

        let Some(user) = self.users.find_by_id(grant.user_id).await else {
            return Err(ProtocolError::invalid_grant());
        };

        let access_token =
            random_hex(ACCESS_TOKEN_BYTES).map_err(|_| ProtocolError::server_error())?;
        let expires_in = self.config.access_token_ttl_secs;
        self.access_tokens
            .put(
                &access_token,
                AccessTokenRecord {
                    user_id: user.id,
                    expires_at: Utc::now() + Duration::seconds(expires_in),
                },
                Utc::now() + Duration::seconds(expires_in),
            )
            .await;

        let id_token = self
            .build_id_token(&user, &grant)
            .map_err(|_| ProtocolError::server_error())?;

        info!(client_id = %request.client_id, "authorization code redeemed");

        Ok(TokenResponse {
            token_type: "Bearer".to_owned(),
            expires_in,
            access_token,
            id_token,
            scope: grant.scopes.join(" "),
        })
    }

    /// Resolve a bearer access token into a userinfo response
    ///
    /// # Errors
    /// `invalid_token` for an unknown or expired token or a vanished user.
    pub async fn lookup_bearer(&self, token: &str) -> Result<UserInfoResponse, ProtocolError> {
        let Some(record) = self.access_tokens.peek(token).await else {
            return Err(ProtocolError::invalid_token());
        };

        let Some(user) = self.users.find_by_id(record.user_id).await else {
            return Err(ProtocolError::invalid_token());
        };

        Ok(UserInfoResponse {
            sub: user.id.to_string(),
            name: user.name.clone().or_else(|| Some(user.email.clone())),
            email: user.email,
            email_verified: true,
        })
    }

    /// Mint a code bound to the request, store it, and build the redirect
    async fn issue_code(
        &self,
        user_id: Uuid,
        request: &AuthorizationRequest,
    ) -> Result<String, ProtocolError> {
        let code = random_hex(CODE_BYTES).map_err(|_| ProtocolError::server_error())?;
        let expires_at = Utc::now() + Duration::seconds(self.config.auth_code_ttl_secs);

        self.codes
            .put(
                &code,
                AuthorizationCode {
                    user_id,
                    client_id: request.client_id.clone(),
                    redirect_uri: request.redirect_uri.clone(),
                    code_challenge: request.code_challenge.clone(),
                    code_challenge_method: request.code_challenge_method.clone(),
                    scopes: request.scopes.clone(),
                    expires_at,
                },
                expires_at,
            )
            .await;

        build_redirect_url(&request.redirect_uri, &code, &request.state)
            .map_err(|_| ProtocolError::server_error())
    }

    /// Sign the ID token with the process signing key
    fn build_id_token(
        &self,
        user: &User,
        grant: &AuthorizationCode,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let has_scope = |s: &str| grant.scopes.iter().any(|scope| scope == s);

        let claims = IdTokenClaims {
            iss: self.config.issuer.clone(),
            sub: user.id.to_string(),
            aud: grant.client_id.clone(),
            iat: now,
            exp: now + self.config.access_token_ttl_secs,
            email: has_scope("email").then(|| user.email.clone()),
            email_verified: has_scope("email").then_some(true),
            name: has_scope("profile")
                .then(|| user.name.clone().unwrap_or_else(|| user.email.clone())),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.signing_key.kid().to_owned());

        jsonwebtoken::encode(&header, &claims, &self.signing_key.encoding_key()?)
            .map_err(|e| AppError::internal(format!("ID token signing failed: {e}")))
    }
}

/// Require a non-empty query parameter
fn require_param<'a>(
    params: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, ProtocolError> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProtocolError::invalid_request(format!("Missing {name}")))
}

/// Append `code` and `state` to a redirect URI, preserving existing query
/// parameters and any fragment
///
/// Pre-existing `code` or `state` parameters on the registered URI are
/// dropped so the freshly issued values always win.
fn build_redirect_url(redirect_uri: &str, code: &str, state: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(redirect_uri)?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "code" && k != "state")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    pairs.push(("code".to_owned(), code.to_owned()));
    pairs.push(("state".to_owned(), state.to_owned()));

    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url.to_string())
}
