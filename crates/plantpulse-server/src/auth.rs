//! Session authentication.
//!
//! Login verifies credentials against an external store and issues an
//! opaque session token; the push channel presents that token before it is
//! subscribed. Tokens live in memory only - a restart invalidates every
//! session, which is acceptable at field-operator scale.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

/// Opaque session token handed to clients on login.
pub type SessionToken = String;

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Username/secret pair rejected. Deliberately does not say which half
    /// was wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The token was valid once but has outlived its lifetime.
    #[error("session token expired")]
    ExpiredToken,

    /// The token was never issued by this process.
    #[error("unknown session token")]
    InvalidToken,
}

/// External credential store collaborator.
///
/// The gateway never stores secrets; it only asks this seam whether a
/// username/secret pair is valid. A directory service or secrets backend
/// implements this in production.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check a username/secret pair.
    async fn verify(&self, username: &str, secret: &str) -> bool;
}

/// Credential store over the static user table from the gateway config.
pub struct StaticCredentialStore {
    users: HashMap<String, String>,
}

impl StaticCredentialStore {
    /// Wrap a username -> secret table.
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn verify(&self, username: &str, secret: &str) -> bool {
        self.users
            .get(username)
            .map(|expected| expected == secret)
            .unwrap_or(false)
    }
}

struct TokenEntry {
    principal: String,
    issued_at: DateTime<Utc>,
}

/// Issues and validates session tokens.
pub struct SessionAuthenticator {
    store: std::sync::Arc<dyn CredentialStore>,
    lifetime: chrono::Duration,
    tokens: Mutex<HashMap<SessionToken, TokenEntry>>,
}

impl SessionAuthenticator {
    /// Create an authenticator delegating verification to `store`. Tokens
    /// expire `lifetime` after issue.
    pub fn new(store: std::sync::Arc<dyn CredentialStore>, lifetime: Duration) -> Self {
        Self {
            store,
            lifetime: chrono::Duration::from_std(lifetime)
                .unwrap_or(chrono::Duration::MAX),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Verify credentials and issue a fresh token.
    pub async fn login(&self, username: &str, secret: &str) -> Result<SessionToken, AuthError> {
        if !self.store.verify(username, secret).await {
            return Err(AuthError::InvalidCredentials);
        }

        let token = generate_token();
        self.tokens.lock().expect("token table poisoned").insert(
            token.clone(),
            TokenEntry {
                principal: username.to_string(),
                issued_at: Utc::now(),
            },
        );
        debug!(principal = username, "issued session token");
        Ok(token)
    }

    /// Validate a token, returning the principal it was issued to.
    /// Expired entries are removed as a side effect.
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        let mut tokens = self.tokens.lock().expect("token table poisoned");
        let entry = tokens.get(token).ok_or(AuthError::InvalidToken)?;

        if Utc::now().signed_duration_since(entry.issued_at) > self.lifetime {
            tokens.remove(token);
            return Err(AuthError::ExpiredToken);
        }

        Ok(entry.principal.clone())
    }

    /// Explicit logout: forget the token. Unknown tokens are a no-op.
    pub fn revoke(&self, token: &str) {
        self.tokens.lock().expect("token table poisoned").remove(token);
    }

    /// Number of live (not yet reaped) tokens.
    pub fn active_tokens(&self) -> usize {
        self.tokens.lock().expect("token table poisoned").len()
    }
}

/// 128 bits of OS randomness, hex encoded.
fn generate_token() -> SessionToken {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
