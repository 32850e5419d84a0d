use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::RngCore;
use tracing::{debug, info};

use crate::db::{Collection, DbOperations, PublicUser, Session, User};
use crate::error::{AppError, AuthError, StoreError};

const TOKEN_BYTES: usize = 32;

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: PublicUser,
}

/// Accounts and session tokens.
///
/// Passwords are stored and compared as plain text. This is a known
/// limitation of the service and deliberately left as is.
pub struct AuthService {
    db: DbOperations,
    token_expiry_hours: i64,
}

impl AuthService {
    pub fn new(db: DbOperations, token_expiry_hours: i64) -> Self {
        Self { db, token_expiry_hours }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        first_name: &str,
    ) -> Result<PublicUser, AppError> {
        if username.is_empty() || password.is_empty() || first_name.is_empty() {
            return Err(AppError::ValidationError("Missing fields".into()));
        }

        let user = self
            .db
            .update(Collection::Users, |users: &mut Vec<User>| {
                if users.iter().any(|u| u.username == username) {
                    return Err(AppError::ConflictError("Username taken".into()));
                }
                let user = User::new(username.to_string(), password.to_string(), first_name.to_string());
                users.push(user.clone());
                Ok(user)
            })
            .await?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user.public())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let users: Vec<User> = self.db.read(Collection::Users).await?;
        let user = users
            .into_iter()
            .find(|u| u.username == username)
            .filter(|u| u.password == password)
            .ok_or(AuthError::InvalidCredentials)?;

        let session = Session::new(generate_token(), user.id.clone(), self.token_expiry_hours);
        let token = session.token.clone();
        self.db
            .update(Collection::Sessions, move |sessions: &mut Vec<Session>| {
                sessions.push(session);
                Ok(())
            })
            .await?;

        info!("User {} logged in", user.username);
        Ok(LoginOutcome { token, user: user.public() })
    }

    /// Resolves a token to its user.
    ///
    /// Unknown tokens, expired sessions and sessions whose user no longer
    /// exists all resolve to `None`. This is a linear scan over every stored
    /// session and nothing is deleted here.
    pub async fn validate_token(&self, token: &str) -> Result<Option<PublicUser>, StoreError> {
        let sessions: Vec<Session> = self.db.read(Collection::Sessions).await?;
        let session = match sessions.into_iter().find(|s| s.token == token) {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_expired() {
            debug!("Rejected expired session for user {}", session.user_id);
            return Ok(None);
        }

        let users: Vec<User> = self.db.read(Collection::Users).await?;
        Ok(users
            .into_iter()
            .find(|u| u.id == session.user_id)
            .map(|u| u.public()))
    }

    /// Drops expired sessions from storage, returning how many were removed.
    pub async fn purge_expired_sessions(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let removed = self
            .db
            .update(Collection::Sessions, |sessions: &mut Vec<Session>| {
                let before = sessions.len();
                sessions.retain(|s| !s.is_expired_at(now));
                Ok(before - sessions.len())
            })
            .await?;

        if removed > 0 {
            info!("Purged {} expired sessions", removed);
        }
        Ok(removed)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
