// ABOUTME: OIDC HTTP handlers - authorize, login, token, userinfo, discovery, JWKS
// ABOUTME: Thin adapters that parse HTTP and delegate to the AuthorizationServer engine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! OIDC route handlers
//!
//! Authorize validation failures render as JSON protocol errors rather than
//! redirects because the redirect URI is itself under validation. Login
//! failures re-render the form with a generic message so nothing on the
//! page says whether the email exists.

use crate::errors::AppError;
use crate::keys::JsonWebKeySet;
use crate::oidc::models::{
    AuthenticationError, BeginOutcome, Credentials, ProtocolError, TokenRequest, TokenResponse,
    UserInfoResponse,
};
use crate::server::ServerResources;
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// GET /.well-known/openid-configuration
pub async fn discovery_handler(State(resources): State<Arc<ServerResources>>) -> Json<Value> {
    Json(crate::discovery::discovery_document(&resources.config))
}

/// GET /oidc/jwks.json
pub async fn jwks_handler(
    State(resources): State<Arc<ServerResources>>,
) -> Result<Json<JsonWebKeySet>, ProtocolError> {
    crate::discovery::jwks_document(&resources.signing_key)
        .map(Json)
        .map_err(|e| {
            tracing::error!("JWKS rendering failed: {}", e);
            ProtocolError::invalid_key()
        })
}

/// GET /oidc/authorize
pub async fn authorize_handler(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request = match resources.engine.validate_authorize_request(&params) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let (session_id, mut session) = match resources.sessions.load(cookie_header(&headers)).await {
        Ok(loaded) => loaded,
        Err(e) => return e.into_response(),
    };

    let client_id = request.client_id.clone();
    match resources.engine.begin_authorization(request, &mut session).await {
        Ok(BeginOutcome::Redirect(location)) => {
            resources.sessions.save(&session_id, session).await;
            redirect_with_session(&resources, &session_id, &location)
        }
        Ok(BeginOutcome::LoginRequired) => {
            debug!(client_id = %client_id, "rendering login form");
            resources.sessions.save(&session_id, session).await;
            login_form_with_session(&resources, &session_id, &client_id, None, StatusCode::OK)
        }
        Err(e) => e.into_response(),
    }
}

/// POST /oidc/authorize (login form submission)
pub async fn login_handler(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let (session_id, mut session) = match resources.sessions.load(cookie_header(&headers)).await {
        Ok(loaded) => loaded,
        Err(e) => return e.into_response(),
    };

    let credentials = Credentials {
        email: form.get("email").cloned().unwrap_or_default(),
        password: form.get("password").cloned().unwrap_or_default(),
    };

    let client_id = session
        .pending_request
        .as_ref()
        .map(|r| r.client_id.clone())
        .unwrap_or_default();

    match resources.engine.authenticate(&credentials, &mut session).await {
        Ok(location) => {
            resources.sessions.save(&session_id, session).await;
            redirect_with_session(&resources, &session_id, &location)
        }
        Err(AuthenticationError::MissingPendingRequest) => {
            ProtocolError::invalid_request("No pending authorization request").into_response()
        }
        Err(AuthenticationError::InvalidCredentials) => {
            resources.sessions.save(&session_id, session).await;
            login_form_with_session(
                &resources,
                &session_id,
                &client_id,
                Some("Invalid email or password"),
                StatusCode::UNAUTHORIZED,
            )
        }
        Err(AuthenticationError::Internal(e)) => e.into_response(),
    }
}

/// POST /oidc/token
pub async fn token_handler(
    State(resources): State<Arc<ServerResources>>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<TokenResponse>, ProtocolError> {
    let request = parse_token_request(&form)?;
    let response = resources.engine.redeem_code(&request).await?;
    Ok(Json(response))
}

/// GET /oidc/userinfo
pub async fn userinfo_handler(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, ProtocolError> {
    let token = bearer_token(&headers).ok_or_else(ProtocolError::invalid_token)?;
    let info = resources.engine.lookup_bearer(token).await?;
    Ok(Json(info))
}

/// Parse the form-encoded token request, requiring every mandatory field
fn parse_token_request(form: &HashMap<String, String>) -> Result<TokenRequest, ProtocolError> {
    let require = |name: &str| -> Result<String, ProtocolError> {
        form.get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| ProtocolError::invalid_request(format!("Missing {name}")))
    };

    Ok(TokenRequest {
        grant_type: require("grant_type")?,
        code: require("code")?,
        redirect_uri: require("redirect_uri")?,
        client_id: require("client_id")?,
        code_verifier: require("code_verifier")?,
        client_secret: form.get("client_secret").cloned(),
    })
}

/// Extract a bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
}

/// Raw Cookie header value, if present and valid UTF-8
fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
}

/// 302 redirect carrying the session cookie
fn redirect_with_session(
    resources: &ServerResources,
    session_id: &str,
    location: &str,
) -> Response {
    match Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .header(header::SET_COOKIE, resources.sessions.cookie_value(session_id))
        .body(axum::body::Body::empty())
    {
        Ok(response) => response,
        Err(e) => AppError::internal(format!("failed to build redirect: {e}")).into_response(),
    }
}

/// Login form response carrying the session cookie
fn login_form_with_session(
    resources: &ServerResources,
    session_id: &str,
    client_id: &str,
    error: Option<&str>,
    status: StatusCode,
) -> Response {
    let cookie = resources.sessions.cookie_value(session_id);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Html(render_login_form(client_id, error)),
    )
        .into_response()
}

/// Render the login page
///
/// The pending authorization request lives in the session, so the form
/// carries only the credential fields. All interpolated values are escaped.
fn render_login_form(client_id: &str, error: Option<&str>) -> String {
    let client = html_escape::encode_text(client_id);
    let error_block = error.map_or_else(String::new, |msg| {
        format!(
            "<p class=\"error\">{}</p>",
            html_escape::encode_text(msg)
        )
    });

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Sign in</title>
  <style>
    body {{ font-family: sans-serif; max-width: 22rem; margin: 4rem auto; }}
    label {{ display: block; margin-top: 1rem; }}
    input {{ width: 100%; padding: 0.4rem; }}
    button {{ margin-top: 1.5rem; padding: 0.5rem 1.5rem; }}
    .error {{ color: #b00020; }}
  </style>
</head>
<body>
  <h1>Sign in</h1>
  <p>Continue to <strong>{client}</strong></p>
  {error_block}
  <form method="post" action="/oidc/authorize">
    <label for="email">Email</label>
    <input type="email" id="email" name="email" required autofocus>
    <label for="password">Password</label>
    <input type="password" id="password" name="password" required>
    <button type="submit">Sign in</button>
  </form>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_request_requires_all_fields() {
        let mut form = HashMap::new();
        form.insert("grant_type".to_owned(), "authorization_code".to_owned());
        form.insert("code".to_owned(), "abc".to_owned());
        form.insert("redirect_uri".to_owned(), "http://x/cb".to_owned());
        form.insert("client_id".to_owned(), "web".to_owned());

        assert!(parse_token_request(&form).is_err());

        form.insert("code_verifier".to_owned(), "verifier".to_owned());
        let request = parse_token_request(&form).unwrap();
        assert_eq!(request.code, "abc");
        assert!(request.client_secret.is_none());
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Bearer tok123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok123"));

        headers.insert(header::AUTHORIZATION, "Basic dXNlcg==".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn login_form_escapes_interpolated_values() {
        let html = render_login_form("<script>alert(1)</script>", Some("bad & worse"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("bad &amp; worse"));
    }
}
