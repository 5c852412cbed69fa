// ABOUTME: User directory trait and static in-memory implementation with bcrypt hashes
// ABOUTME: Password verification runs on the blocking pool and is timing-uniform
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! User directory
//!
//! Users are seeded at startup from configuration; there is no runtime
//! registration. Password verification always performs exactly one bcrypt
//! comparison, whether or not the email maps to a user, so response timing
//! does not reveal account existence.

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A well-formed bcrypt hash that matches no real password
///
/// Verified against when the presented email has no account, so the
/// failure path costs the same as a real password check.
pub const INVALID_PASSWORD_HASH: &str =
    "$2b$10$upyMO9.9gtxGYdTWaG.sreJVlu45j25Z7m0S1Kh1tghYofJDHdYcS";

/// An authenticatable end user
#[derive(Debug, Clone)]
pub struct User {
    /// Stable subject identifier, minted at seed time
    pub id: Uuid,
    /// Login identifier, unique within the directory
    pub email: String,
    /// Display name, if any
    pub name: Option<String>,
    /// Bcrypt password hash
    pub password_hash: String,
}

/// Read-only lookup interface over the user population
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by login email
    async fn find_by_email(&self, email: &str) -> Option<User>;

    /// Find a user by subject identifier
    async fn find_by_id(&self, id: Uuid) -> Option<User>;
}

/// In-memory directory seeded once at startup
pub struct StaticUserDirectory {
    by_email: HashMap<String, Arc<User>>,
    by_id: HashMap<Uuid, Arc<User>>,
}

impl StaticUserDirectory {
    /// Build the directory from plaintext demo credentials, hashing each
    /// password with the given bcrypt cost
    ///
    /// # Errors
    /// Returns an error if bcrypt hashing fails
    pub fn from_plaintext(users: &[(String, String, String)], cost: u32) -> AppResult<Self> {
        let mut by_email = HashMap::new();
        let mut by_id = HashMap::new();

        for (email, name, password) in users {
            let password_hash = bcrypt::hash(password, cost)
                .map_err(|e| AppError::internal(format!("bcrypt hashing failed: {e}")))?;

            let user = Arc::new(User {
                id: Uuid::new_v4(),
                email: email.clone(),
                name: Some(name.clone()).filter(|n| !n.is_empty()),
                password_hash,
            });

            by_email.insert(user.email.clone(), Arc::clone(&user));
            by_id.insert(user.id, user);
        }

        Ok(Self { by_email, by_id })
    }

    /// Number of seeded users
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the directory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find_by_email(&self, email: &str) -> Option<User> {
        self.by_email.get(email).map(|u| (**u).clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.by_id.get(&id).map(|u| (**u).clone())
    }
}

/// Verify a password against a bcrypt hash on the blocking pool
///
/// Bcrypt is deliberately slow; running it inline would stall the async
/// worker threads.
///
/// # Errors
/// Returns an error if the blocking task fails or the hash is malformed
pub async fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("password verification task failed: {e}")))?
        .map_err(|e| AppError::internal(format!("bcrypt verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the test suite fast; production seeding uses DEFAULT_COST
    const TEST_COST: u32 = 4;

    fn demo_directory() -> StaticUserDirectory {
        StaticUserDirectory::from_plaintext(
            &[(
                "demo@example.com".to_owned(),
                "Demo User".to_owned(),
                "password".to_owned(),
            )],
            TEST_COST,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lookup_by_email_and_id_agree() {
        let directory = demo_directory();

        let user = directory.find_by_email("demo@example.com").await.unwrap();
        assert_eq!(user.name.as_deref(), Some("Demo User"));

        let by_id = directory.find_by_id(user.id).await.unwrap();
        assert_eq!(by_id.email, user.email);

        assert!(directory.find_by_email("nobody@example.com").await.is_none());
    }

    #[tokio::test]
    async fn correct_password_verifies() {
        let directory = demo_directory();
        let user = directory.find_by_email("demo@example.com").await.unwrap();

        assert!(verify_password("password", &user.password_hash).await.unwrap());
        assert!(!verify_password("wrong", &user.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn reference_hash_rejects_everything() {
        assert!(!verify_password("password", INVALID_PASSWORD_HASH)
            .await
            .unwrap());
        assert!(!verify_password("", INVALID_PASSWORD_HASH).await.unwrap());
    }
}
