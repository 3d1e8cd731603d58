//! Credential Store
//! Mission: Persist user accounts and refresh tokens with SQLite

use crate::auth::models::{User, UserRole};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

/// Credential storage with SQLite backend. Owns the users and
/// refresh_tokens tables; all queries are parameterized - the middleware
/// injection heuristic is a second layer, never the protection itself.
pub struct CredentialStore {
    db_path: String,
}

impl CredentialStore {
    /// Create a new store and initialize the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // One row per user: a new login or refresh rotates the token in
        // place, which is what enforces single-session semantics.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS refresh_tokens (
                user_id TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Look up a user by (already normalized) email.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, email, username, password_hash, role, created_at, updated_at
             FROM users WHERE email = ?1",
        )?;

        let user_result = stmt.query_row(params![email], row_to_user);

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_user_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, email, username, password_hash, role, created_at, updated_at
             FROM users WHERE id = ?1",
        )?;

        let user_result = stmt.query_row(params![user_id.to_string()], row_to_user);

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a new user. The UNIQUE constraint on email is the
    /// authoritative duplicate check; callers classify that failure with
    /// [`is_duplicate_email`].
    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        username: &str,
        role: UserRole,
    ) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, email, username, password_hash, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.email,
                user.username,
                user.password_hash,
                user.role.as_str(),
                user.created_at,
                user.updated_at,
            ],
        )
        .context("Failed to insert user")?;

        info!(email = %user.email, role = user.role.as_str(), "✅ Created user");

        Ok(user)
    }

    /// Change a user's role. Returns false when no such user exists.
    pub fn update_user_role(&self, email: &str, role: UserRole) -> Result<bool> {
        let conn = Connection::open(&self.db_path)?;

        let rows = conn.execute(
            "UPDATE users SET role = ?1, updated_at = ?2 WHERE email = ?3",
            params![role.as_str(), Utc::now().to_rfc3339(), email],
        )?;

        if rows > 0 {
            info!(email = %email, role = role.as_str(), "Updated user role");
        }
        Ok(rows > 0)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, email, username, password_hash, role, created_at, updated_at
             FROM users ORDER BY created_at",
        )?;

        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Upsert the single refresh-token row for a user. Atomic: a concurrent
    /// login and refresh for the same user resolve to last-writer-wins with
    /// no torn state.
    pub fn insert_or_rotate_refresh_token(
        &self,
        user_id: &Uuid,
        token: &str,
        expires_at: i64,
    ) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "INSERT INTO refresh_tokens (user_id, token, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 token = excluded.token,
                 expires_at = excluded.expires_at,
                 created_at = excluded.created_at",
            params![
                user_id.to_string(),
                token,
                expires_at,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to rotate refresh token")?;

        Ok(())
    }

    /// True iff the stored token for this user exactly matches the presented
    /// value and has not expired. A signature-valid token that was rotated
    /// away or deleted at logout fails here.
    pub fn find_refresh_token(&self, user_id: &Uuid, token: &str) -> Result<bool> {
        let conn = Connection::open(&self.db_path)?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM refresh_tokens
             WHERE user_id = ?1 AND token = ?2 AND expires_at > ?3",
            params![user_id.to_string(), token, Utc::now().timestamp()],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Delete by token value. Idempotent: deleting an absent token is fine.
    pub fn delete_refresh_token(&self, token: &str) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute("DELETE FROM refresh_tokens WHERE token = ?1", params![token])?;

        Ok(())
    }

    /// Housekeeping sweep for rows from users who never log out.
    pub fn delete_expired_refresh_tokens(&self) -> Result<usize> {
        let conn = Connection::open(&self.db_path)?;

        let rows = conn.execute(
            "DELETE FROM refresh_tokens WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;

        Ok(rows)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(4)?;
    Ok(User {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::from_str(&role_str).unwrap_or(UserRole::Customer),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Classify a `create_user` failure as the email UNIQUE constraint firing.
pub fn is_duplicate_email(err: &anyhow::Error) -> bool {
    matches!(
        err.root_cause().downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (CredentialStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = CredentialStore::new(db_path).unwrap();
        (store, temp_file)
    }

    fn insert_user(store: &CredentialStore, email: &str) -> User {
        store
            .create_user(email, "hash", "someone", UserRole::Customer)
            .unwrap()
    }

    #[test]
    fn test_create_and_find_user() {
        let (store, _temp) = create_test_store();

        let created = insert_user(&store, "alice@example.com");

        let found = store.find_user_by_email("alice@example.com").unwrap();
        assert!(found.is_some());
        let found = found.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, UserRole::Customer);

        let by_id = store.find_user_by_id(&created.id).unwrap();
        assert_eq!(by_id.unwrap().email, "alice@example.com");

        assert!(store.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_hits_constraint() {
        let (store, _temp) = create_test_store();

        insert_user(&store, "dup@example.com");
        let err = store
            .create_user("dup@example.com", "hash2", "other", UserRole::Customer)
            .unwrap_err();

        assert!(is_duplicate_email(&err));
    }

    #[test]
    fn test_update_user_role() {
        let (store, _temp) = create_test_store();

        insert_user(&store, "promo@example.com");
        assert!(store
            .update_user_role("promo@example.com", UserRole::Admin)
            .unwrap());

        let user = store.find_user_by_email("promo@example.com").unwrap().unwrap();
        assert_eq!(user.role, UserRole::Admin);

        assert!(!store
            .update_user_role("ghost@example.com", UserRole::Driver)
            .unwrap());
    }

    #[test]
    fn test_refresh_token_rotation_is_upsert() {
        let (store, _temp) = create_test_store();
        let user = insert_user(&store, "rot@example.com");
        let future = Utc::now().timestamp() + 3600;

        store
            .insert_or_rotate_refresh_token(&user.id, "token-one", future)
            .unwrap();
        assert!(store.find_refresh_token(&user.id, "token-one").unwrap());

        // Rotation replaces the single row; the old value is gone.
        store
            .insert_or_rotate_refresh_token(&user.id, "token-two", future)
            .unwrap();
        assert!(!store.find_refresh_token(&user.id, "token-one").unwrap());
        assert!(store.find_refresh_token(&user.id, "token-two").unwrap());
    }

    #[test]
    fn test_expired_refresh_token_not_found() {
        let (store, _temp) = create_test_store();
        let user = insert_user(&store, "exp@example.com");

        let past = Utc::now().timestamp() - 10;
        store
            .insert_or_rotate_refresh_token(&user.id, "stale", past)
            .unwrap();

        assert!(!store.find_refresh_token(&user.id, "stale").unwrap());
        assert_eq!(store.delete_expired_refresh_tokens().unwrap(), 1);
    }

    #[test]
    fn test_delete_refresh_token_idempotent() {
        let (store, _temp) = create_test_store();
        let user = insert_user(&store, "del@example.com");
        let future = Utc::now().timestamp() + 3600;

        store
            .insert_or_rotate_refresh_token(&user.id, "bye", future)
            .unwrap();
        store.delete_refresh_token("bye").unwrap();
        assert!(!store.find_refresh_token(&user.id, "bye").unwrap());

        // Second delete of the same value is not an error.
        store.delete_refresh_token("bye").unwrap();
    }

    #[test]
    fn test_list_users() {
        let (store, _temp) = create_test_store();

        insert_user(&store, "one@example.com");
        insert_user(&store, "two@example.com");

        assert_eq!(store.list_users().unwrap().len(), 2);
    }
}
