//! Session management
//!
//! A session is a database row tying a random token to a user and an
//! expiration time. The browser holds the token in a cookie signed with
//! HMAC-SHA256, so a forged or altered cookie is rejected before the
//! database is consulted.
//!
//! Cookie value format: `<token>--<base64url(hmac_sha256(secret, token))>`.

use anyhow::{anyhow, Result};
use axum::http::{header, HeaderMap};
use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};

type HmacSha256 = Hmac<Sha256>;

/// Separator between token and signature in the cookie value
const SIGNATURE_SEPARATOR: &str = "--";

/// Current time as unix seconds
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// New unguessable session token (64 hex characters)
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Signs and verifies session cookie values
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: &str) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow!("Invalid session secret: {}", e))?;
        Ok(Self { mac })
    }

    fn signature(&self, token: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// `<token>--<signature>`
    pub fn sign(&self, token: &str) -> String {
        format!(
            "{}{}{}",
            token,
            SIGNATURE_SEPARATOR,
            BASE64URL_NOPAD.encode(&self.signature(token))
        )
    }

    /// The token inside a signed value, if the signature matches.
    pub fn verify<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (token, signature) = value.rsplit_once(SIGNATURE_SEPARATOR)?;
        if token.is_empty() {
            return None;
        }
        let signature = BASE64URL_NOPAD.decode(signature.as_bytes()).ok()?;

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token)
    }
}

/// Creates, resolves and destroys login sessions
pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    signer: CookieSigner,
    cookie_name: String,
    ttl_seconds: i64,
    secure_cookie: bool,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        config: &SessionConfig,
        secret: &str,
    ) -> Result<Self> {
        Ok(Self {
            sessions,
            users,
            signer: CookieSigner::new(secret)?,
            cookie_name: config.cookie_name.clone(),
            ttl_seconds: config.ttl_seconds,
            secure_cookie: config.secure_cookie,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Start a session for `user`, valid for the configured lifetime.
    pub async fn create(&self, user: &User) -> Result<Session> {
        let session = Session {
            id: 0,
            user_id: user.id,
            expiration: now().saturating_add(self.ttl_seconds),
            token: generate_token(),
        };
        let session = self.sessions.create(&session).await?;
        tracing::debug!("Created session {} for user {}", session.id, user.id);
        Ok(session)
    }

    /// The session row for `token`, expired or not
    pub async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        self.sessions.find_by_token(token).await
    }

    /// Resolve a token into its live session and owner.
    ///
    /// An expired row is deleted on the way.
    pub async fn validate(&self, token: &str) -> Result<Option<(Session, User)>> {
        self.validate_at(token, now()).await
    }

    /// [`SessionManager::validate`] against an explicit clock
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<Option<(Session, User)>> {
        let Some(session) = self.sessions.find_by_token(token).await? else {
            return Ok(None);
        };

        if session.is_expired(now) {
            tracing::debug!("Session {} expired, removing", session.id);
            self.sessions.delete(session.id).await?;
            return Ok(None);
        }

        match self.users.get_by_id(session.user_id).await? {
            Some(user) => Ok(Some((session, user))),
            None => Ok(None),
        }
    }

    /// Resolve a signed cookie value. Bad signatures resolve to nothing.
    pub async fn authenticate_cookie(&self, value: &str) -> Result<Option<(Session, User)>> {
        match self.signer.verify(value) {
            Some(token) => self.validate(token).await,
            None => {
                tracing::debug!("Rejected session cookie with invalid signature");
                Ok(None)
            }
        }
    }

    /// Delete a session. Deleting one that is already gone is fine.
    pub async fn delete(&self, session: &Session) -> Result<()> {
        if !self.sessions.delete(session.id).await? {
            tracing::debug!("Session {} was already deleted", session.id);
        }
        Ok(())
    }

    /// Delete every session of a user
    pub async fn delete_for_user(&self, user_id: i64) -> Result<u64> {
        self.sessions.delete_by_user(user_id).await
    }

    /// Delete all expired sessions, returning how many went
    pub async fn sweep_expired(&self) -> Result<u64> {
        self.sessions.delete_expired(now()).await
    }

    /// `Set-Cookie` value carrying the signed token of `session`
    pub fn session_cookie(&self, session: &Session) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            self.signer.sign(&session.token),
            self.ttl_seconds
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.cookie_name
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// The session cookie value of a request, if any
    pub fn cookie_from_headers<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        read_cookie(headers, &self.cookie_name)
    }

    /// Sweep expired sessions every `interval` until the runtime shuts down.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.sweep_expired().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Swept {} expired session(s)", count),
                    Err(e) => tracing::warn!("Failed to sweep expired sessions: {:#}", e),
                }
            }
        })
    }
}

/// Find a cookie by name across all `Cookie` headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
