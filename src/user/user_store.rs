use super::auth::{AuthToken, AuthTokenValue, PasswordCredentials};
use super::user_models::User;
use anyhow::Result;

pub trait UserAuthCredentialsStore: Send + Sync {
    /// Returns the password credentials of the user with the given handle.
    /// Returns Ok(None) if the user does not exist or has no password.
    fn get_password_credentials(&self, user_handle: &str) -> Result<Option<PasswordCredentials>>;

    /// Inserts or replaces the password credentials of `credentials.user_id`.
    fn set_password_credentials(&self, credentials: &PasswordCredentials) -> Result<()>;

    /// Records a login attempt against the user's password credentials.
    /// `last_tried` is always updated, `last_used` only when `succeeded`.
    fn record_password_attempt(&self, user_id: usize, succeeded: bool) -> Result<()>;
}

pub trait UserAuthTokenStore: Send + Sync {
    /// Returns Ok(None) if the token does not exist.
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Deletes an auth token, returning the deleted token if there was one.
    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()>;

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()>;
}

pub trait UserStore: UserAuthTokenStore + UserAuthCredentialsStore + Send + Sync {
    /// Creates a new user and returns the user id.
    /// Fails if the handle is already taken.
    fn create_user(&self, user_handle: &str, email: &str) -> Result<usize>;

    fn get_user(&self, user_id: usize) -> Result<Option<User>>;

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>>;

    fn get_all_users(&self) -> Result<Vec<User>>;

    fn count_users(&self) -> Result<usize>;

    /// Deletes a user together with everything it owns.
    /// Returns false if the user did not exist.
    fn delete_user(&self, user_id: usize) -> Result<bool>;
}
