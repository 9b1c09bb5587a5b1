use super::{auth::PasswordCredentials, AuthToken, AuthTokenValue, User, UserStore};
use anyhow::{bail, Context, Result};
use std::{sync::Arc, time::SystemTime};
use tracing::{debug, info};

pub struct UserManager {
    user_store: Arc<dyn UserStore>,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn UserStore>) -> Self {
        Self { user_store }
    }

    pub fn handle_exists(&self, user_handle: &str) -> Result<bool> {
        Ok(self.user_store.get_user_id(user_handle)?.is_some())
    }

    /// Creates a user that can log in with `password`.
    pub fn add_user_with_password(
        &self,
        user_handle: &str,
        email: &str,
        password: &str,
    ) -> Result<usize> {
        if user_handle.is_empty() {
            bail!("The user handle cannot be empty.");
        }
        if self.handle_exists(user_handle)? {
            bail!("User handle {} already exists.", user_handle);
        }
        let user_id = self.user_store.create_user(user_handle, email)?;
        let credentials = PasswordCredentials::new(user_id, password)?;
        self.user_store
            .set_password_credentials(&credentials)
            .with_context(|| format!("Failed to store credentials of {}", user_handle))?;
        info!("Created user {} (id={})", user_handle, user_id);
        Ok(user_id)
    }

    pub fn set_password(&self, user_handle: &str, password: &str) -> Result<()> {
        let user_id = self
            .user_store
            .get_user_id(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        self.user_store
            .set_password_credentials(&PasswordCredentials::new(user_id, password)?)
    }

    /// Verifies the password and, on success, issues a new session token.
    /// Returns Ok(None) for unknown users and wrong passwords alike.
    pub fn login(&self, user_handle: &str, password: &str) -> Result<Option<AuthToken>> {
        let Some(credentials) = self.user_store.get_password_credentials(user_handle)? else {
            debug!("No password credentials for {}", user_handle);
            return Ok(None);
        };
        let succeeded = credentials.matches(password);
        self.user_store
            .record_password_attempt(credentials.user_id, succeeded)?;
        if !succeeded {
            return Ok(None);
        }
        self.generate_auth_token(credentials.user_id).map(Some)
    }

    pub fn generate_auth_token(&self, user_id: usize) -> Result<AuthToken> {
        let token = AuthToken {
            user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_user_auth_token(token.clone())?;
        Ok(token)
    }

    pub fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        self.user_store.get_user_auth_token(value)
    }

    pub fn update_auth_token_last_used(&self, value: &AuthTokenValue) -> Result<()> {
        self.user_store
            .update_user_auth_token_last_used_timestamp(value)
    }

    /// Returns whether a token was actually removed.
    pub fn logout(&self, value: &AuthTokenValue) -> Result<bool> {
        Ok(self.user_store.delete_user_auth_token(value)?.is_some())
    }

    pub fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        self.user_store.get_user(user_id)
    }

    pub fn get_all_users(&self) -> Result<Vec<User>> {
        self.user_store.get_all_users()
    }

    pub fn count_users(&self) -> Result<usize> {
        self.user_store.count_users()
    }

    pub fn delete_user(&self, user_handle: &str) -> Result<()> {
        let user_id = self
            .user_store
            .get_user_id(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        self.user_store.delete_user(user_id)?;
        info!("Deleted user {} (id={})", user_handle, user_id);
        Ok(())
    }
}
