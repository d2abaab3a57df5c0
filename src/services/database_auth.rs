use async_trait::async_trait;
use std::sync::Arc;

use crate::crypto::password::{hash_password, verify_password};
use crate::crypto::token;
use crate::error::{AppError, Result};

/// Default path of the login form handler.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Credential storage for password logins.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Stores a new user and returns its ID.
    async fn create(&self, email: &str, password_hash: &str) -> Result<String>;

    /// Returns `(user_id, password_hash)` for `email`, or `None` if unknown.
    async fn get(&self, email: &str) -> Result<Option<(String, String)>>;
}

/// Paths for the password login flow.
#[derive(Debug, Clone)]
pub struct DatabaseAuthSettings {
    pub login_path: String,
    /// Where to 302 after a successful login. Empty means reply 200.
    pub redirect_path: String,
}

impl Default for DatabaseAuthSettings {
    fn default() -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            redirect_path: "/".to_string(),
        }
    }
}

/// Email/password authentication against a `UserStore`.
pub struct DatabaseAuth {
    users: Arc<dyn UserStore>,
    settings: DatabaseAuthSettings,
}

impl DatabaseAuth {
    /// Fails with a configuration error when no user store is supplied.
    pub fn new(users: Option<Arc<dyn UserStore>>, settings: DatabaseAuthSettings) -> Result<Self> {
        let users = users
            .ok_or_else(|| AppError::Config("databaseauth: UserStore not configured".to_string()))?;
        Ok(Self { users, settings })
    }

    pub fn login_path(&self) -> &str {
        &self.settings.login_path
    }

    pub fn redirect_path(&self) -> &str {
        &self.settings.redirect_path
    }

    /// Registers a user with a freshly salted password hash.
    ///
    /// # Returns
    ///
    /// The new user's ID.
    pub async fn create(&self, email: &str, password: &str) -> Result<String> {
        let hash = hash_password(password, &token::new_short());
        let user_id = self.users.create(email, &hash).await?;
        tracing::info!("✅ User {} registered", user_id);
        Ok(user_id)
    }

    /// Checks a password login.
    ///
    /// # Returns
    ///
    /// `Some(user_id)` if the email is known and the password matches.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<String>> {
        let Some((user_id, stored)) = self.users.get(email).await? else {
            // keep unknown emails as slow as wrong passwords
            let _ = hash_password(password, &token::new_short());
            return Ok(None);
        };
        if verify_password(password, &stored) {
            Ok(Some(user_id))
        } else {
            tracing::debug!("Password mismatch for user {}", user_id);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryUserStore;

    fn auth() -> DatabaseAuth {
        DatabaseAuth::new(
            Some(Arc::new(MemoryUserStore::default()) as Arc<dyn UserStore>),
            DatabaseAuthSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn missing_user_store_is_a_config_error() {
        let result = DatabaseAuth::new(None, DatabaseAuthSettings::default());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn created_users_can_log_in() {
        let auth = auth();
        let user_id = auth.create("a@b.c", "pw").await.unwrap();

        assert_eq!(auth.login("a@b.c", "pw").await.unwrap(), Some(user_id));
        assert_eq!(auth.login("a@b.c", "wrong").await.unwrap(), None);
        assert_eq!(auth.login("x@b.c", "pw").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hashes_are_salted_per_user() {
        let store = Arc::new(MemoryUserStore::default());
        let auth = DatabaseAuth::new(
            Some(store.clone() as Arc<dyn UserStore>),
            DatabaseAuthSettings::default(),
        )
        .unwrap();
        auth.create("a@b.c", "pw").await.unwrap();
        auth.create("d@e.f", "pw").await.unwrap();

        let (_, first) = UserStore::get(&*store, "a@b.c").await.unwrap().unwrap();
        let (_, second) = UserStore::get(&*store, "d@e.f").await.unwrap().unwrap();
        assert_ne!(first, second);
    }
}
