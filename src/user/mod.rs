pub mod auth;
mod user_manager;
pub mod user_models;
mod user_store;

pub use auth::{AuthToken, AuthTokenValue, CredentialsHasher, PasswordCredentials};
pub use user_manager::UserManager;
pub use user_models::User;
pub use user_store::{UserAuthCredentialsStore, UserAuthTokenStore, UserStore};
