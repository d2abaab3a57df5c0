use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::oauth::AccessToken;
use crate::services::{database_auth, oauth};

#[derive(Debug, Clone)]
struct Credentials {
    user_id: String,
    password_hash: String,
}

/// A process-local user store backing both password and OAuth logins.
/// Users are numbered `u1`, `u2`, ... in creation order.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    by_email: RwLock<HashMap<String, Credentials>>,
    by_access_token: RwLock<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> String {
        format!("u{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Seeds a password user with a known ID and hash.
    pub async fn insert(&self, email: &str, user_id: &str, password_hash: &str) {
        self.by_email.write().await.insert(
            email.to_lowercase(),
            Credentials {
                user_id: user_id.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
    }
}

#[async_trait]
impl database_auth::UserStore for MemoryUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<String> {
        let mut users = self.by_email.write().await;
        let key = email.to_lowercase();
        if users.contains_key(&key) {
            return Err(AppError::Validation(format!("{} is already registered", email)));
        }
        let user_id = self.allocate_id();
        users.insert(
            key,
            Credentials {
                user_id: user_id.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user_id)
    }

    async fn get(&self, email: &str) -> Result<Option<(String, String)>> {
        let users = self.by_email.read().await;
        Ok(users
            .get(&email.to_lowercase())
            .map(|c| (c.user_id.clone(), c.password_hash.clone())))
    }
}

#[async_trait]
impl oauth::UserStore for MemoryUserStore {
    async fn get(&self, token: &AccessToken) -> Result<Option<String>> {
        Ok(self
            .by_access_token
            .read()
            .await
            .get(&token.access_token)
            .cloned())
    }

    async fn create(&self, token: &AccessToken) -> Result<String> {
        let user_id = self.allocate_id();
        self.by_access_token
            .write()
            .await
            .insert(token.access_token.clone(), user_id.clone());
        Ok(user_id)
    }

    async fn save(&self, user_id: &str, token: &AccessToken) -> Result<()> {
        self.by_access_token
            .write()
            .await
            .insert(token.access_token.clone(), user_id.to_string());
        Ok(())
    }
}
