// ABOUTME: End-to-end tests for the authorization code flow over the HTTP surface
// ABOUTME: Drives the router directly with tower::ServiceExt, no listening socket
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use axum::body::Body;
use axum::Router;
use chrono::{Duration, Utc};
use http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{decode, Algorithm, Validation};
use oidc_provider::config::ServerConfig;
use oidc_provider::keys::SigningKey;
use oidc_provider::oidc::models::{AccessTokenRecord, IdTokenClaims};
use oidc_provider::pkce;
use oidc_provider::server::ServerResources;
use oidc_provider::store::StoreConfig;
use oidc_provider::users::StaticUserDirectory;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

const CLIENT_ID: &str = "fastapi-client";
const REDIRECT_URI: &str = "http://localhost:3000/callback?source=fastapi";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

// Low bcrypt cost keeps the suite fast
const TEST_BCRYPT_COST: u32 = 4;

async fn test_resources() -> Arc<ServerResources> {
    let config = ServerConfig::default();
    let signing_key = SigningKey::generate_with_key_size("demo-key", 2048).unwrap();

    let demo_users: Vec<(String, String, String)> = config
        .demo_users
        .iter()
        .map(|u| (u.email.clone(), u.name.clone(), u.password.clone()))
        .collect();
    let users = StaticUserDirectory::from_plaintext(&demo_users, TEST_BCRYPT_COST).unwrap();

    Arc::new(ServerResources::new(
        config,
        signing_key,
        Arc::new(users),
        &StoreConfig {
            enable_background_cleanup: false,
            ..StoreConfig::default()
        },
    ))
}

fn authorize_uri(params: &[(&str, &str)]) -> String {
    let query = serde_urlencoded::to_string(params).unwrap();
    format!("/oidc/authorize?{query}")
}

fn default_authorize_uri() -> String {
    authorize_uri(&[
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("scope", "openid profile email"),
        ("state", "xyz-state"),
        ("code_challenge", &pkce::challenge_s256(VERIFIER)),
        ("code_challenge_method", "S256"),
    ])
}

async fn get(router: &Router, uri: &str) -> http::Response<Body> {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(
    router: &Router,
    uri: &str,
    cookie: Option<&str>,
    form: &[(&str, &str)],
) -> http::Response<Body> {
    let body = serde_urlencoded::to_string(form).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    router
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: http::Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(response: &http::Response<Body>) -> String {
    let value = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie missing")
        .to_str()
        .unwrap();
    value.split(';').next().unwrap().to_owned()
}

/// Run authorize + login, returning the code from the redirect Location
async fn obtain_code(router: &Router, authorize_uri: &str) -> String {
    let response = get(router, authorize_uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);

    let response = post_form(
        router,
        "/oidc/authorize",
        Some(&cookie),
        &[("email", "demo@example.com"), ("password", "password")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    let url = Url::parse(location).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .expect("code missing from redirect")
}

async fn redeem(router: &Router, code: &str, verifier: &str) -> http::Response<Body> {
    post_form(
        router,
        "/oidc/token",
        None,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("code_verifier", verifier),
        ],
    )
    .await
}

#[tokio::test]
async fn full_authorization_code_flow() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(Arc::clone(&resources));

    // Authorize renders the login form and binds a session
    let response = get(&router, &default_authorize_uri()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    assert!(cookie.starts_with("oidc_session="));

    // Login redirects back to the client with code and state
    let response = post_form(
        &router,
        "/oidc/authorize",
        Some(&cookie),
        &[("email", "demo@example.com"), ("password", "password")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    let url = Url::parse(location).unwrap();
    assert_eq!(url.host_str(), Some("localhost"));
    assert_eq!(url.path(), "/callback");

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // The registered URI's own query parameter survives
    assert!(pairs.contains(&("source".to_owned(), "fastapi".to_owned())));
    assert!(pairs.contains(&("state".to_owned(), "xyz-state".to_owned())));

    let code = pairs
        .iter()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.clone())
        .unwrap();
    assert_eq!(code.len(), 64); // 256 bits, hex encoded

    // Redeem the code
    let response = redeem(&router, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], "openid profile email");
    let access_token = body["access_token"].as_str().unwrap().to_owned();
    assert_eq!(access_token.len(), 80); // 320 bits, hex encoded

    // The ID token verifies against the published key
    let id_token = body["id_token"].as_str().unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[CLIENT_ID]);
    validation.set_issuer(&["http://localhost:8000"]);
    let decoded = decode::<IdTokenClaims>(
        id_token,
        &resources.signing_key.decoding_key().unwrap(),
        &validation,
    )
    .unwrap();

    assert_eq!(decoded.header.kid.as_deref(), Some("demo-key"));
    assert_eq!(decoded.claims.email.as_deref(), Some("demo@example.com"));
    assert_eq!(decoded.claims.email_verified, Some(true));
    assert_eq!(decoded.claims.name.as_deref(), Some("Demo User"));
    assert!(Uuid::parse_str(&decoded.claims.sub).is_ok());

    // Userinfo with the bearer token
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oidc/userinfo")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], "demo@example.com");
    assert_eq!(body["name"], "Demo User");
    assert_eq!(body["email_verified"], true);
    assert_eq!(body["sub"], decoded.claims.sub);
}

#[tokio::test]
async fn code_replay_is_rejected() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let code = obtain_code(&router, &default_authorize_uri()).await;

    let response = redeem(&router, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = redeem(&router, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body, serde_json::json!({"error": "invalid_grant"}));
}

#[tokio::test]
async fn failed_pkce_consumes_the_code() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let code = obtain_code(&router, &default_authorize_uri()).await;

    let response = redeem(&router, &code, "definitely-not-the-right-verifier-at-all").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");

    // The correct verifier no longer helps
    let response = redeem(&router, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn omitted_challenge_method_defaults_to_s256() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let uri = authorize_uri(&[
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("scope", "openid"),
        ("state", "s"),
        ("code_challenge", &pkce::challenge_s256(VERIFIER)),
    ]);
    let code = obtain_code(&router, &uri).await;

    let response = redeem(&router, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn plain_challenge_method_is_rejected() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let uri = authorize_uri(&[
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("scope", "openid"),
        ("state", "s"),
        ("code_challenge", VERIFIER),
        ("code_challenge_method", "plain"),
    ]);
    let response = get(&router, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn unknown_client_and_bad_redirect_are_rejected_before_redirecting() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let uri = authorize_uri(&[
        ("client_id", "no-such-client"),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("scope", "openid"),
        ("state", "s"),
        ("code_challenge", &pkce::challenge_s256(VERIFIER)),
    ]);
    let response = get(&router, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["error_description"], "Unknown client");

    let uri = authorize_uri(&[
        ("client_id", CLIENT_ID),
        ("redirect_uri", "http://evil.example/steal"),
        ("response_type", "code"),
        ("scope", "openid"),
        ("state", "s"),
        ("code_challenge", &pkce::challenge_s256(VERIFIER)),
    ]);
    let response = get(&router, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_description"], "Invalid redirect_uri");
}

#[tokio::test]
async fn authorize_requires_scope_state_and_challenge() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    for missing in ["scope", "state", "code_challenge"] {
        let params: Vec<(&str, &str)> = [
            ("client_id", CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("response_type", "code"),
            ("scope", "openid"),
            ("state", "s"),
            ("code_challenge", "not-a-real-challenge-but-present"),
        ]
        .into_iter()
        .filter(|(k, _)| *k != missing)
        .collect();

        let response = get(&router, &authorize_uri(&params)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "missing {missing}");
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["error_description"], format!("Missing {missing}"));
    }
}

#[tokio::test]
async fn redirect_mismatch_at_token_endpoint_is_invalid_grant() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let code = obtain_code(&router, &default_authorize_uri()).await;

    let response = post_form(
        &router,
        "/oidc/token",
        None,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://localhost:3000/callback?source=goa"),
            ("client_id", CLIENT_ID),
            ("code_verifier", VERIFIER),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body, serde_json::json!({"error": "invalid_grant"}));
}

#[tokio::test]
async fn unsupported_grant_type_is_named() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let response = post_form(
        &router,
        "/oidc/token",
        None,
        &[
            ("grant_type", "client_credentials"),
            ("code", "abc"),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("code_verifier", VERIFIER),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn login_failures_look_identical_for_unknown_email_and_wrong_password() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let response = get(&router, &default_authorize_uri()).await;
    let cookie = session_cookie(&response);

    for credentials in [
        [("email", "nobody@example.com"), ("password", "password")],
        [("email", "demo@example.com"), ("password", "wrong")],
    ] {
        let response = post_form(&router, "/oidc/authorize", Some(&cookie), &credentials).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Invalid email or password"));
        assert!(!html.contains("nobody@example.com"));
    }
}

#[tokio::test]
async fn login_without_pending_request_is_rejected() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    let response = post_form(
        &router,
        "/oidc/authorize",
        None,
        &[("email", "demo@example.com"), ("password", "password")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn expired_access_token_is_unauthorized() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(Arc::clone(&resources));

    resources
        .access_tokens
        .put(
            "stale-token",
            AccessTokenRecord {
                user_id: Uuid::new_v4(),
                expires_at: Utc::now() - Duration::seconds(1),
            },
            Utc::now() - Duration::seconds(1),
        )
        .await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oidc/userinfo")
                .header(header::AUTHORIZATION, "Bearer stale-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body, serde_json::json!({"error": "invalid_token"}));

    // Missing header gets the same answer
    let response = get(&router, "/oidc/userinfo").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn discovery_and_jwks_agree_with_the_signing_key() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(Arc::clone(&resources));

    let response = get(&router, "/.well-known/openid-configuration").await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;

    assert_eq!(doc["issuer"], "http://localhost:8000");
    assert_eq!(
        doc["authorization_endpoint"],
        "http://localhost:8000/oidc/authorize"
    );
    assert_eq!(doc["jwks_uri"], "http://localhost:8000/oidc/jwks.json");
    assert_eq!(doc["response_types_supported"][0], "code");
    assert_eq!(doc["code_challenge_methods_supported"][0], "S256");
    assert_eq!(doc["id_token_signing_alg_values_supported"][0], "RS256");

    let response = get(&router, "/oidc/jwks.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    let jwks = json_body(response).await;

    let keys = jwks["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["alg"], "RS256");
    assert_eq!(keys[0]["use"], "sig");
    assert_eq!(keys[0]["kid"], "demo-key");
    let expected = resources.signing_key.public_jwk().unwrap();
    assert_eq!(keys[0]["n"], expected.n);
}

#[tokio::test]
async fn authenticated_session_skips_the_login_form() {
    let resources = test_resources().await;
    let router = oidc_provider::routes::router(resources);

    // First round authenticates the session
    let response = get(&router, &default_authorize_uri()).await;
    let cookie = session_cookie(&response);
    let response = post_form(
        &router,
        "/oidc/authorize",
        Some(&cookie),
        &[("email", "demo@example.com"), ("password", "password")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    // Second authorize with the same session redirects immediately
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(default_authorize_uri())
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("code="));
}
