// ABOUTME: Environment-based server configuration for deployment-specific settings
// ABOUTME: Immutable struct constructed once at startup and shared by reference
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Environment-based configuration
//!
//! All runtime settings live in one immutable [`ServerConfig`] built at
//! process start. Nothing reads the environment after startup.

use anyhow::{bail, Context, Result};
use std::env;
use tracing::warn;

/// A relying party entry from configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client identifier
    pub client_id: String,
    /// The one redirect URI registered for this client
    pub redirect_uri: String,
}

/// A demo user seeded into the static user directory
#[derive(Debug, Clone)]
pub struct DemoUserConfig {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Issuer URL baked into ID tokens and discovery metadata
    pub issuer: String,
    /// Key id for the static signing key
    pub key_id: String,
    /// Private key PEM, if configured (absent in development generates
    /// an ephemeral key with a warning)
    pub private_key_pem: Option<String>,
    /// Registered relying parties
    pub clients: Vec<ClientConfig>,
    /// Scopes advertised in the discovery document
    pub default_scopes: Vec<String>,
    /// Authorization code lifetime in seconds
    pub auth_code_ttl_secs: i64,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Browser session lifetime in seconds
    pub session_ttl_secs: i64,
    /// Demo users for the static user directory
    pub demo_users: Vec<DemoUserConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            issuer: "http://localhost:8000".to_owned(),
            key_id: "demo-key".to_owned(),
            private_key_pem: None,
            clients: vec![
                ClientConfig {
                    client_id: "fastapi-client".to_owned(),
                    redirect_uri: "http://localhost:3000/callback?source=fastapi".to_owned(),
                },
                ClientConfig {
                    client_id: "goa-client".to_owned(),
                    redirect_uri: "http://localhost:3000/callback?source=goa".to_owned(),
                },
            ],
            default_scopes: vec![
                "openid".to_owned(),
                "profile".to_owned(),
                "email".to_owned(),
            ],
            auth_code_ttl_secs: 600,
            access_token_ttl_secs: 3600,
            session_ttl_secs: 3600,
            demo_users: vec![DemoUserConfig {
                email: "demo@example.com".to_owned(),
                name: "Demo User".to_owned(),
                password: "password".to_owned(),
            }],
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// A missing issuer falls back to a local placeholder and is never
    /// fatal. Missing key material is tolerated here (an ephemeral key is
    /// generated later with a warning); unparseable key material fails at
    /// key load time.
    ///
    /// # Errors
    /// Returns an error on malformed values (ports, client entries) or an
    /// unreadable key file.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let http_port = match env::var("HTTP_PORT") {
            Ok(v) => v
                .parse::<u16>()
                .with_context(|| format!("invalid HTTP_PORT value: {v}"))?,
            Err(_) => defaults.http_port,
        };

        let issuer = env::var("OIDC_ISSUER")
            .map(|v| v.trim_end_matches('/').to_owned())
            .unwrap_or_else(|_| {
                warn!("OIDC_ISSUER not set, using local placeholder issuer");
                defaults.issuer.clone()
            });

        let key_id = env::var("OIDC_KEY_ID").unwrap_or(defaults.key_id);

        let private_key_pem = match env::var("OIDC_PRIVATE_KEY") {
            Ok(pem) if !pem.trim().is_empty() => Some(pem),
            _ => match env::var("OIDC_PRIVATE_KEY_PATH") {
                Ok(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read signing key at {path}"))?,
                ),
                Err(_) => None,
            },
        };

        let clients = match env::var("OIDC_CLIENTS") {
            Ok(raw) => parse_clients(&raw)?,
            Err(_) => defaults.clients,
        };

        let demo_users = match env::var("OIDC_DEMO_USERS") {
            Ok(raw) => parse_demo_users(&raw)?,
            Err(_) => defaults.demo_users,
        };

        Ok(Self {
            http_port,
            issuer,
            key_id,
            private_key_pem,
            clients,
            demo_users,
            ..defaults
        })
    }

    /// One-line startup summary for the logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "issuer={} port={} kid={} clients={} signing_key={}",
            self.issuer,
            self.http_port,
            self.key_id,
            self.clients.len(),
            if self.private_key_pem.is_some() {
                "configured"
            } else {
                "ephemeral"
            }
        )
    }
}

/// Parse `client_id|redirect_uri` pairs, comma separated
fn parse_clients(raw: &str) -> Result<Vec<ClientConfig>> {
    let mut clients = Vec::new();

    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let Some((client_id, redirect_uri)) = entry.trim().split_once('|') else {
            bail!("malformed OIDC_CLIENTS entry (expected id|redirect_uri): {entry}");
        };
        clients.push(ClientConfig {
            client_id: client_id.trim().to_owned(),
            redirect_uri: redirect_uri.trim().to_owned(),
        });
    }

    if clients.is_empty() {
        bail!("OIDC_CLIENTS is set but contains no client entries");
    }

    Ok(clients)
}

/// Parse `email|name|password` triples, comma separated
fn parse_demo_users(raw: &str) -> Result<Vec<DemoUserConfig>> {
    let mut users = Vec::new();

    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let parts: Vec<&str> = entry.trim().splitn(3, '|').collect();
        let [email, name, password] = parts[..] else {
            bail!("malformed OIDC_DEMO_USERS entry (expected email|name|password): {entry}");
        };
        users.push(DemoUserConfig {
            email: email.trim().to_owned(),
            name: name.trim().to_owned(),
            password: password.to_owned(),
        });
    }

    Ok(users)
}
