// ABOUTME: Identity provider server binary entry point
// ABOUTME: Loads configuration and key material, seeds demo users, serves HTTP
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! OIDC provider server binary

use anyhow::Result;
use clap::Parser;
use oidc_provider::config::ServerConfig;
use oidc_provider::keys::SigningKey;
use oidc_provider::logging;
use oidc_provider::server::ServerResources;
use oidc_provider::store::StoreConfig;
use oidc_provider::users::StaticUserDirectory;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "oidc-provider",
    about = "Minimal OpenID Connect identity provider (authorization code flow with PKCE)",
    version
)]
struct Args {
    /// HTTP port to listen on (overrides HTTP_PORT)
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    info!("starting OIDC provider: {}", config.summary());

    let signing_key = match config.private_key_pem.as_deref() {
        Some(pem) => SigningKey::from_pem(&config.key_id, pem)?,
        None => {
            warn!(
                "no signing key configured, generating an ephemeral key; \
                 tokens will not verify across restarts"
            );
            SigningKey::generate(&config.key_id)?
        }
    };

    let demo_users: Vec<(String, String, String)> = config
        .demo_users
        .iter()
        .map(|u| (u.email.clone(), u.name.clone(), u.password.clone()))
        .collect();
    let users = StaticUserDirectory::from_plaintext(&demo_users, bcrypt::DEFAULT_COST)?;
    info!("seeded {} demo user(s)", users.len());

    let resources = Arc::new(ServerResources::new(
        config,
        signing_key,
        Arc::new(users),
        &StoreConfig::default(),
    ));

    resources.run().await
}
