// src/auth.rs
use crate::error::AppError;
use crate::models::UserId;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

/// A stored hash that cannot be parsed counts as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?;
    Ok(verified.unwrap_or_else(|e| {
        warn!("Stored password hash is unusable: {}", e);
        false
    }))
}

struct Session {
    user_id: UserId,
    expires_at: i64,
}

/// Server-side sessions keyed by an opaque id. The browser only holds a signed token
/// naming that id, so a forged cookie never reaches the map.
pub struct SessionStore {
    secret: Vec<u8>,
    ttl_secs: i64,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        SessionStore {
            secret: secret.as_bytes().to_vec(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a session for `user_id` and returns the cookie token.
    pub async fn issue(&self, user_id: UserId) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let expires_at = now.saturating_add(self.ttl_secs);
        let session_id = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: session_id.clone(),
            exp: usize::try_from(expires_at).unwrap_or(usize::MAX),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| AppError::Internal(format!("failed to sign session: {}", e)))?;

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(session_id, Session { user_id, expires_at });
        Ok(token)
    }

    pub async fn resolve(&self, token: &str) -> Option<UserId> {
        let session_id = self.session_id(token, true)?;
        let sessions = self.sessions.read().await;
        let session = sessions.get(&session_id)?;
        (session.expires_at > Utc::now().timestamp()).then_some(session.user_id)
    }

    /// Forgets the session behind `token`, expired or not.
    pub async fn revoke(&self, token: &str) {
        if let Some(session_id) = self.session_id(token, false) {
            self.sessions.write().await.remove(&session_id);
        }
    }

    fn session_id(&self, token: &str, validate_exp: bool) -> Option<String> {
        let validation = Validation {
            validate_exp,
            ..Validation::default()
        };
        match decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                debug!("Ignoring session cookie: {}", e);
                None
            }
        }
    }
}

pub fn session_cookie(token: &str) -> String {
    format!("{}={}; HttpOnly; SameSite=Lax; Path=/", SESSION_COOKIE, token)
}

pub fn cleared_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_hash_is_salted_and_verifies() {
        let first = hash_password("hunter2".to_string(), 4).await.unwrap();
        let second = hash_password("hunter2".to_string(), 4).await.unwrap();
        assert_ne!(first, second);
        assert!(verify_password("hunter2".to_string(), first.clone()).await.unwrap());
        assert!(!verify_password("hunter3".to_string(), first).await.unwrap());
        assert!(!verify_password("hunter2".to_string(), "not-a-hash".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn issued_session_resolves_until_revoked() {
        let store = SessionStore::new("secret", 3600);
        let token = store.issue(42).await.unwrap();
        assert_eq!(store.resolve(&token).await, Some(42));

        store.revoke(&token).await;
        assert_eq!(store.resolve(&token).await, None);
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_ignored() {
        let ours = SessionStore::new("secret", 3600);
        let theirs = SessionStore::new("other", 3600);
        let forged = theirs.issue(1).await.unwrap();
        assert_eq!(ours.resolve(&forged).await, None);
        assert_eq!(ours.resolve("garbage").await, None);
    }

    #[tokio::test]
    async fn expired_session_does_not_resolve() {
        let store = SessionStore::new("secret", 0);
        let token = store.issue(7).await.unwrap();
        assert_eq!(store.resolve(&token).await, None);
    }
}
