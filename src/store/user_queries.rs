use super::{conversion_error, now_seconds, system_time_from_column, SqliteStore};
use crate::user::{
    AuthToken, AuthTokenValue, CredentialsHasher, PasswordCredentials, User,
    UserAuthCredentialsStore, UserAuthTokenStore, UserStore,
};
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};
use std::str::FromStr;
use std::time::UNIX_EPOCH;

const AUTH_TOKEN_COLUMNS: &str = "user_id, value, created, last_used";

fn auth_token_from_row(row: &Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        user_id: row.get(0)?,
        value: AuthTokenValue(row.get(1)?),
        created: system_time_from_column(row.get(2)?),
        last_used: row.get::<_, Option<i64>>(3)?.map(system_time_from_column),
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        handle: row.get(1)?,
        email: row.get(2)?,
        created: system_time_from_column(row.get(3)?),
    })
}

impl UserAuthTokenStore for SqliteStore {
    fn get_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {AUTH_TOKEN_COLUMNS} FROM auth_token WHERE value = ?1"),
                params![value.0],
                auth_token_from_row,
            )
            .optional()?)
    }

    fn delete_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn()?;
        let token = conn
            .query_row(
                &format!("SELECT {AUTH_TOKEN_COLUMNS} FROM auth_token WHERE value = ?1"),
                params![value.0],
                auth_token_from_row,
            )
            .optional()?;
        if token.is_some() {
            conn.execute("DELETE FROM auth_token WHERE value = ?1", params![value.0])?;
        }
        Ok(token)
    }

    fn update_user_auth_token_last_used_timestamp(&self, value: &AuthTokenValue) -> Result<()> {
        self.conn()?.execute(
            "UPDATE auth_token SET last_used = ?1 WHERE value = ?2",
            params![now_seconds(), value.0],
        )?;
        Ok(())
    }

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()> {
        let created = token
            .created
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_else(|_| now_seconds());
        self.conn()?.execute(
            "INSERT INTO auth_token (user_id, value, created) VALUES (?1, ?2, ?3)",
            params![token.user_id, token.value.0, created],
        )?;
        Ok(())
    }
}

impl UserAuthCredentialsStore for SqliteStore {
    fn get_password_credentials(&self, user_handle: &str) -> Result<Option<PasswordCredentials>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT c.user_id, c.salt, c.hash, c.hasher, c.created, c.last_tried, c.last_used
                 FROM user_password_credentials c JOIN user u ON u.id = c.user_id
                 WHERE u.handle = ?1",
                params![user_handle],
                |row| {
                    let hasher = CredentialsHasher::from_str(&row.get::<_, String>(3)?)
                        .map_err(|e| conversion_error(3, std::io::Error::other(e.to_string())))?;
                    Ok(PasswordCredentials {
                        user_id: row.get(0)?,
                        salt: row.get(1)?,
                        hash: row.get(2)?,
                        hasher,
                        created: system_time_from_column(row.get(4)?),
                        last_tried: row.get::<_, Option<i64>>(5)?.map(system_time_from_column),
                        last_used: row.get::<_, Option<i64>>(6)?.map(system_time_from_column),
                    })
                },
            )
            .optional()?)
    }

    fn set_password_credentials(&self, credentials: &PasswordCredentials) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO user_password_credentials (user_id, salt, hash, hasher)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    salt = excluded.salt,
                    hash = excluded.hash,
                    hasher = excluded.hasher,
                    created = excluded.created,
                    last_tried = NULL,
                    last_used = NULL",
                params![
                    credentials.user_id,
                    credentials.salt,
                    credentials.hash,
                    credentials.hasher.to_string()
                ],
            )
            .with_context(|| {
                format!("Failed to store credentials of user {}", credentials.user_id)
            })?;
        Ok(())
    }

    fn record_password_attempt(&self, user_id: usize, succeeded: bool) -> Result<()> {
        self.conn()?.execute(
            "UPDATE user_password_credentials
             SET last_tried = ?1, last_used = CASE WHEN ?2 THEN ?1 ELSE last_used END
             WHERE user_id = ?3",
            params![now_seconds(), succeeded, user_id],
        )?;
        Ok(())
    }
}

impl UserStore for SqliteStore {
    fn create_user(&self, user_handle: &str, email: &str) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user (handle, email) VALUES (?1, ?2)",
            params![user_handle, email],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT id, handle, email, created FROM user WHERE id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()?)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT id FROM user WHERE handle = ?1",
                params![user_handle],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn get_all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, handle, email, created FROM user ORDER BY id")?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn count_users(&self) -> Result<usize> {
        Ok(self
            .conn()?
            .query_row("SELECT COUNT(*) FROM user", [], |row| row.get(0))?)
    }

    fn delete_user(&self, user_id: usize) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM user WHERE id = ?1", params![user_id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db")).unwrap();
        (store, temp_dir)
    }

    fn token_for(user_id: usize) -> AuthToken {
        AuthToken {
            user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        }
    }

    #[test]
    fn creates_and_counts_users() {
        let (store, _dir) = create_tmp_store();
        assert_eq!(store.count_users().unwrap(), 0);

        let id = store.create_user("ada", "ada@example.com").unwrap();
        store.create_user("grace", "grace@example.com").unwrap();

        assert_eq!(store.count_users().unwrap(), 2);
        assert_eq!(store.get_user_id("ada").unwrap(), Some(id));
        let user = store.get_user(id).unwrap().unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(store.get_user_id("nobody").unwrap().is_none());
        assert!(store.create_user("ada", "again@example.com").is_err());
    }

    #[test]
    fn auth_token_lifecycle() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user("ada", "ada@example.com").unwrap();
        let token = token_for(user_id);
        store.add_user_auth_token(token.clone()).unwrap();

        let stored = store.get_user_auth_token(&token.value).unwrap().unwrap();
        assert_eq!(stored.user_id, user_id);
        assert!(stored.last_used.is_none());

        store
            .update_user_auth_token_last_used_timestamp(&token.value)
            .unwrap();
        let touched = store.get_user_auth_token(&token.value).unwrap().unwrap();
        assert!(touched.last_used.is_some());

        let deleted = store.delete_user_auth_token(&token.value).unwrap();
        assert!(deleted.is_some());
        assert!(store.get_user_auth_token(&token.value).unwrap().is_none());
        assert!(store.delete_user_auth_token(&token.value).unwrap().is_none());
    }

    #[test]
    fn password_credentials_are_replaced_not_duplicated() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user("ada", "ada@example.com").unwrap();

        store
            .set_password_credentials(&PasswordCredentials::new(user_id, "first-pass").unwrap())
            .unwrap();
        store.record_password_attempt(user_id, true).unwrap();
        let first = store.get_password_credentials("ada").unwrap().unwrap();
        assert!(first.last_used.is_some());

        store
            .set_password_credentials(&PasswordCredentials::new(user_id, "second-pass").unwrap())
            .unwrap();
        let second = store.get_password_credentials("ada").unwrap().unwrap();
        assert!(second.matches("second-pass"));
        assert!(!second.matches("first-pass"));
        assert!(second.last_used.is_none());

        let rows: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM user_password_credentials", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn failed_attempt_does_not_mark_credentials_used() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user("ada", "ada@example.com").unwrap();
        store
            .set_password_credentials(&PasswordCredentials::new(user_id, "first-pass").unwrap())
            .unwrap();
        store.record_password_attempt(user_id, false).unwrap();

        let credentials = store.get_password_credentials("ada").unwrap().unwrap();
        assert!(credentials.last_tried.is_some());
        assert!(credentials.last_used.is_none());
    }

    #[test]
    fn deleting_user_cascades_to_tokens_and_credentials() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user("ada", "ada@example.com").unwrap();
        let token = token_for(user_id);
        store.add_user_auth_token(token.clone()).unwrap();
        store
            .set_password_credentials(&PasswordCredentials::new(user_id, "first-pass").unwrap())
            .unwrap();

        assert!(store.delete_user(user_id).unwrap());
        assert!(store.get_user_auth_token(&token.value).unwrap().is_none());
        assert!(store.get_password_credentials("ada").unwrap().is_none());
        assert!(!store.delete_user(user_id).unwrap());
    }
}
