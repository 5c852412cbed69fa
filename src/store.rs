// ABOUTME: Time-bounded in-memory grant store with atomic single-use retrieval
// ABOUTME: Generic over the stored value type; one store instance per grant kind
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Ephemeral grant store
//!
//! A generic TTL key-value store backing authorization codes, access token
//! records, and browser sessions. Each grant kind gets its own typed store
//! instance so keys cannot collide across kinds.
//!
//! `pull` is the one operation with a strict atomicity requirement: the
//! value is returned and removed under a single write lock, so a concurrent
//! `pull` on the same key observes the value at most once. That atomicity
//! is what enforces authorization-code single-use under concurrent
//! redemption attempts. Expiry is authoritative for validity; the
//! background cleanup task only reclaims storage.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;

/// Default interval between cleanup sweeps
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Cleanup interval for expired entries
    pub cleanup_interval: Duration,
    /// Enable background cleanup task (disable in tests to avoid runtime churn)
    pub enable_background_cleanup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
        }
    }
}

/// Stored value with absolute expiry
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory TTL store with atomic destructive reads
///
/// Shared state is `Arc<RwLock<HashMap>>`; the cleanup task holds only a
/// `Weak` reference and exits once every store handle has been dropped.
#[derive(Clone)]
pub struct TtlStore<V> {
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
}

impl<V: Clone + Send + Sync + 'static> TtlStore<V> {
    /// Create a new store, optionally spawning the cleanup task
    ///
    /// Must be called from within a tokio runtime when background cleanup
    /// is enabled.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));

        if config.enable_background_cleanup {
            let weak: Weak<RwLock<HashMap<String, Entry<V>>>> = Arc::downgrade(&entries);
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    let Some(entries) = weak.upgrade() else {
                        tracing::debug!("grant store dropped, stopping cleanup task");
                        break;
                    };
                    Self::cleanup_expired(&entries).await;
                }
            });
        }

        Self { entries }
    }

    /// Insert or overwrite a value; unreadable strictly after `expires_at`
    pub async fn put(&self, key: &str, value: V, expires_at: DateTime<Utc>) {
        let entry = Entry { value, expires_at };
        self.entries.write().await.insert(key.to_owned(), entry);
    }

    /// Non-destructive read; `None` if absent or expired
    pub async fn peek(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.remove(key);
                return None;
            }
            return Some(entry.value.clone());
        }

        None
    }

    /// Atomic destructive read
    ///
    /// The value is returned and the key removed under one write lock, so
    /// at most one concurrent `pull` for a key can observe the value.
    pub async fn pull(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().await;

        let entry = entries.remove(key)?;
        if entry.is_expired() {
            return None;
        }

        Some(entry.value)
    }

    /// Remove a key without reading it
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Number of live (possibly expired but unreclaimed) entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove all expired entries
    async fn cleanup_expired(entries: &Arc<RwLock<HashMap<String, Entry<V>>>>) {
        let mut guard = entries.write().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired());
        let removed = before - guard.len();
        drop(guard);

        if removed > 0 {
            tracing::debug!("cleaned up {} expired grant entries", removed);
        }
    }
}
