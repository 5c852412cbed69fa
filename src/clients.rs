// ABOUTME: Static relying-party registry keyed by client id
// ABOUTME: Built once from configuration; each client binds exactly one redirect URI
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use crate::config::ClientConfig;
use std::collections::HashMap;

/// A registered relying party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    /// Client identifier
    pub client_id: String,
    /// Exact-match redirect URI (no wildcards)
    pub redirect_uri: String,
}

/// Immutable client allow-list, keyed by client id
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, RegisteredClient>,
}

impl ClientRegistry {
    /// Build the registry from configuration, once at startup
    #[must_use]
    pub fn from_config(clients: &[ClientConfig]) -> Self {
        let clients = clients
            .iter()
            .map(|c| {
                (
                    c.client_id.clone(),
                    RegisteredClient {
                        client_id: c.client_id.clone(),
                        redirect_uri: c.redirect_uri.clone(),
                    },
                )
            })
            .collect();

        Self { clients }
    }

    /// Look up a client by id; no side effects
    #[must_use]
    pub fn lookup(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    /// Number of registered clients
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
