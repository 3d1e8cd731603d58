//! Auth Service
//! Mission: Orchestrate registration, login, token refresh, and logout

use crate::auth::models::{SessionContext, User, UserRole};
use crate::auth::sessions::SessionStore;
use crate::auth::store::{is_duplicate_email, CredentialStore};
use crate::auth::tokens::TokenIssuer;
use crate::errors::AuthError;
use bcrypt::DEFAULT_COST;
use lazy_static::lazy_static;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

lazy_static! {
    // Verified against when login hits an unknown email, so the timing of
    // the response does not reveal whether the account exists.
    static ref DUMMY_HASH: String =
        bcrypt::hash("plateful-timing-equalizer", DEFAULT_COST).expect("bcrypt dummy hash");
}

/// Successful register/login outcome: the persisted user, both tokens, and
/// the session context the request layer attaches.
#[derive(Debug)]
pub struct AuthOutcome {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub session: SessionContext,
}

/// Pure orchestrator over the credential store, token issuer, and session
/// table. Owns none of them.
pub struct AuthService {
    store: Arc<CredentialStore>,
    tokens: Arc<TokenIssuer>,
    sessions: Arc<SessionStore>,
}

impl AuthService {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: Arc<TokenIssuer>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            store,
            tokens,
            sessions,
        }
    }

    /// Create an account and authenticate it in one step.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(email);

        // Advisory pre-check; the UNIQUE constraint catches the race.
        let existing = self.store.find_user_by_email(&email).map_err(internal)?;
        if existing.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = hash_password(password.to_string()).await?;

        let user = self
            .store
            .create_user(&email, &password_hash, username, UserRole::Customer)
            .map_err(|e| {
                if is_duplicate_email(&e) {
                    AuthError::EmailAlreadyExists
                } else {
                    internal(e)
                }
            })?;

        self.issue_and_establish(user)
    }

    /// Authenticate an existing account. Unknown email and wrong password
    /// are deliberately the same failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(email);

        let user = self.store.find_user_by_email(&email).map_err(internal)?;

        let Some(user) = user else {
            // Burn the same bcrypt work as the real path.
            let _ = verify_password(password.to_string(), DUMMY_HASH.clone()).await;
            warn!(email = %email, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        };

        let valid = verify_password(password.to_string(), user.password_hash.clone()).await?;
        if !valid {
            warn!(email = %email, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        info!(email = %user.email, role = user.role.as_str(), "✅ Login successful");

        self.issue_and_establish(user)
    }

    /// Rotate a refresh token: verify signature, require the stored row to
    /// match exactly (a rotated-away or logged-out token has valid
    /// signature but no row), then issue and persist a fresh pair.
    pub async fn refresh(&self, presented: &str) -> Result<(String, String), AuthError> {
        let claims = self
            .tokens
            .verify_refresh_token(presented)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidRefreshToken)?;

        let stored = self
            .store
            .find_refresh_token(&user_id, presented)
            .map_err(internal)?;
        if !stored {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .store
            .find_user_by_id(&user_id)
            .map_err(internal)?
            .ok_or(AuthError::UserNotFound)?;

        let (access_token, _) = self
            .tokens
            .issue_access_token(user.id, &user.role)
            .map_err(internal)?;
        let (refresh_token, expires_at) =
            self.tokens.issue_refresh_token(user.id).map_err(internal)?;

        self.store
            .insert_or_rotate_refresh_token(&user.id, &refresh_token, expires_at)
            .map_err(internal)?;

        // Only refreshes an existing mirror; never creates one here.
        self.sessions.refresh(SessionContext::for_user(&user));

        Ok((access_token, refresh_token))
    }

    /// Logout always succeeds from the client's point of view. Internal
    /// failures are logged and swallowed.
    pub async fn logout(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token else {
            return;
        };

        if let Err(e) = self.store.delete_refresh_token(token) {
            error!("Failed to delete refresh token at logout: {e:#}");
        }

        // Destroying the session mirror needs the user id, which only a
        // verifiable token can supply. An unverifiable token skips this.
        if let Ok(claims) = self.tokens.verify_refresh_token(token) {
            if let Ok(user_id) = Uuid::parse_str(&claims.sub) {
                self.sessions.destroy(&user_id);
            }
        }
    }

    /// Inert stub: no reset token is generated, stored, or mailed. The
    /// handler answers with the same generic message either way so the
    /// endpoint cannot be used to enumerate accounts.
    pub async fn forgot_password(&self, email: &str) {
        let email = normalize_email(email);
        match self.store.find_user_by_email(&email) {
            Ok(Some(_)) => info!(email = %email, "Password reset requested"),
            Ok(None) => info!("Password reset requested for unknown email"),
            Err(e) => error!("Password reset lookup failed: {e:#}"),
        }
    }

    /// Inert stub, paired with `forgot_password`. No password is mutated.
    pub async fn reset_password(&self, _token: &str, _new_password: &str) {}

    fn issue_and_establish(&self, user: User) -> Result<AuthOutcome, AuthError> {
        let (access_token, _) = self
            .tokens
            .issue_access_token(user.id, &user.role)
            .map_err(internal)?;
        let (refresh_token, expires_at) =
            self.tokens.issue_refresh_token(user.id).map_err(internal)?;

        self.store
            .insert_or_rotate_refresh_token(&user.id, &refresh_token, expires_at)
            .map_err(internal)?;

        let session = SessionContext::for_user(&user);
        self.sessions.establish(session.clone());

        Ok(AuthOutcome {
            user,
            access_token,
            refresh_token,
            session,
        })
    }
}

/// Lowercase and trim: exactly one user per email regardless of casing.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Bcrypt is CPU-bound; run it on the blocking pool so it never stalls the
/// request workers.
async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, DEFAULT_COST))
        .await
        .map_err(internal)?
        .map_err(internal)
}

async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(internal)?
        .map_err(internal)
}

fn internal<E: std::fmt::Display>(e: E) -> AuthError {
    error!("auth internal error: {e}");
    AuthError::Internal
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_service() -> (AuthService, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store =
            Arc::new(CredentialStore::new(temp_file.path().to_str().unwrap()).unwrap());
        let tokens = Arc::new(TokenIssuer::new(
            "access-secret-for-tests-0123456789ab".to_string(),
            "refresh-secret-for-tests-0123456789a".to_string(),
        ));
        let sessions = Arc::new(SessionStore::new());
        (AuthService::new(store, tokens, sessions), temp_file)
    }

    #[tokio::test]
    async fn test_register_then_duplicate_fails() {
        let (service, _temp) = test_service();

        let outcome = service
            .register("alice@example.com", "Sw0rd!234", "alice")
            .await
            .unwrap();
        assert_eq!(outcome.user.email, "alice@example.com");
        assert_eq!(outcome.user.role, UserRole::Customer);
        assert!(!outcome.access_token.is_empty());
        assert!(!outcome.refresh_token.is_empty());
        assert!(outcome.session.authenticated);

        // Same email, different casing: still a duplicate.
        let err = service
            .register("Alice@Example.com", "other-pass", "alice2")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::EmailAlreadyExists);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _temp) = test_service();

        service
            .register("bob@example.com", "correct-horse", "bob")
            .await
            .unwrap();

        let wrong_password = service
            .login("bob@example.com", "wrong-horse")
            .await
            .unwrap_err();
        let unknown_email = service
            .login("nobody@example.com", "whatever")
            .await
            .unwrap_err();

        assert_eq!(wrong_password, AuthError::InvalidCredentials);
        assert_eq!(unknown_email, wrong_password);
    }

    #[tokio::test]
    async fn test_login_returns_stored_role() {
        let (service, _temp) = test_service();

        service
            .register("carol@example.com", "password1", "carol")
            .await
            .unwrap();

        let outcome = service.login("carol@example.com", "password1").await.unwrap();
        assert_eq!(outcome.user.role, UserRole::Customer);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_supersedes() {
        let (service, _temp) = test_service();

        let outcome = service
            .register("dave@example.com", "password1", "dave")
            .await
            .unwrap();
        let original = outcome.refresh_token;

        let (access, rotated) = service.refresh(&original).await.unwrap();
        assert!(!access.is_empty());
        assert_ne!(rotated, original);

        // The superseded token is dead.
        let err = service.refresh(&original).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidRefreshToken);

        // The rotated token keeps working.
        service.refresh(&rotated).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rotation_invalidates_previous_session_token() {
        let (service, _temp) = test_service();

        let first = service
            .register("eve@example.com", "password1", "eve")
            .await
            .unwrap();
        let second = service.login("eve@example.com", "password1").await.unwrap();

        // Single active session: the registration-issued token was rotated
        // away by the login.
        let err = service.refresh(&first.refresh_token).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidRefreshToken);
        service.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (service, _temp) = test_service();

        let outcome = service
            .register("fred@example.com", "password1", "fred")
            .await
            .unwrap();
        let token = outcome.refresh_token;

        service.logout(Some(&token)).await;
        service.logout(Some(&token)).await; // second call: still fine
        service.logout(None).await;

        // The deleted token no longer refreshes.
        let err = service.refresh(&token).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidRefreshToken);
    }

    #[tokio::test]
    async fn test_refresh_for_vanished_user() {
        let (service, _temp) = test_service();

        // A signature-valid token whose subject was never a stored user:
        // plant its row directly to get past the exact-match check.
        let ghost = Uuid::new_v4();
        let (token, expires_at) = service.tokens.issue_refresh_token(ghost).unwrap();
        service
            .store
            .insert_or_rotate_refresh_token(&ghost, &token, expires_at)
            .unwrap();

        let err = service.refresh(&token).await.unwrap_err();
        assert_eq!(err, AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn test_forged_refresh_token_rejected() {
        let (service, _temp) = test_service();

        let outcome = service
            .register("gina@example.com", "password1", "gina")
            .await
            .unwrap();

        // An access token presented as a refresh token never verifies.
        let err = service.refresh(&outcome.access_token).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidRefreshToken);
    }
}
