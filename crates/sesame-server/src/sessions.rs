//! Session lifecycle: login, access validation, refresh and logout.
//!
//! A session is active while `revoked_at IS NULL AND expires_at > now`.
//! Revocation is explicit (logout or cap eviction); expiry is never written
//! back and is checked on every read.

use crate::error::{AuthError, UnauthorizedKind};
use crate::tokens::{generate_opaque_secret, hash_opaque_secret, TokenService};
use chrono::{Duration, Utc};
use sesame_common::models::auth::{Claims, SessionView};
use sesame_db::{NewSession, SessionRepo, UserRepo, UserRow};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub const MAX_SESSIONS_PER_USER: i64 = 5;

/// Lifetime of a session without "remember me".
pub fn default_session_ttl() -> Duration {
    Duration::hours(24)
}

/// Lifetime of a session with "remember me".
pub fn remember_me_session_ttl() -> Duration {
    Duration::days(30)
}

/// Client-supplied details recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_type: String,
    pub remember_me: bool,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    /// Raw refresh secret. Handed to the client once, never stored.
    pub refresh_token: String,
    pub current_session: SessionView,
    pub other_sessions: Vec<SessionView>,
}

#[derive(Clone)]
pub struct SessionManager {
    pool: PgPool,
    tokens: Arc<TokenService>,
    max_sessions: i64,
}

impl SessionManager {
    pub fn new(pool: PgPool, tokens: Arc<TokenService>, max_sessions: i64) -> Self {
        Self {
            pool,
            tokens,
            max_sessions,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Open a session for an already authenticated user.
    ///
    /// Insert and cap enforcement commit together; a failure leaves neither
    /// the new session nor any eviction behind.
    #[tracing::instrument(skip(self, user, device), fields(user_id = %user.id))]
    pub async fn login(&self, user: &UserRow, device: DeviceInfo) -> Result<LoginOutcome, AuthError> {
        let refresh_token = generate_opaque_secret()?;
        let ttl = if device.remember_me {
            remember_me_session_ttl()
        } else {
            default_session_ttl()
        };

        let new = NewSession {
            session_id: Uuid::new_v4(),
            token_hash: hash_opaque_secret(&refresh_token),
            user_id: user.id,
            device_name: device.device_name,
            device_type: device.device_type,
            remember_me: device.remember_me,
            expires_at: Utc::now() + ttl,
            ip_address: device.ip_address.filter(|ip| !ip.is_empty()),
            user_agent: device.user_agent,
        };

        let created = SessionRepo::create_and_prune(&self.pool, &new, self.max_sessions)
            .await
            .map_err(AuthError::Persistence)?;
        if created.pruned > 0 {
            tracing::info!(
                "Session cap reached for user {}, revoked {} least recently used session(s)",
                user.id,
                created.pruned
            );
        }

        let access_token = self.tokens.issue_access_token(
            user.id,
            &user.email,
            &user.username,
            created.session.session_id,
        )?;

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            current_session: created.session.view(),
            other_sessions: created.others.iter().map(|s| s.view()).collect(),
        })
    }

    /// Validate an access token and confirm its session is still live.
    #[tracing::instrument(skip(self, token))]
    pub async fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.tokens.validate_access_token(token)?;

        let session_id = Uuid::parse_str(&claims.session_id)
            .map_err(|_| AuthError::Unauthorized(UnauthorizedKind::TokenInvalid))?;

        let session = SessionRepo::get_active_by_id(&self.pool, session_id)
            .await
            .map_err(AuthError::Persistence)?
            .ok_or(AuthError::Unauthorized(UnauthorizedKind::TokenExpired))?;

        if session.user_id.to_string() != claims.user_id {
            tracing::warn!(
                "Access token for user {} names session {} owned by someone else",
                claims.user_id,
                session_id
            );
            return Err(AuthError::Unauthorized(UnauthorizedKind::TokenInvalid));
        }

        Ok(claims)
    }

    /// Exchange a refresh secret for a new access token on the same session.
    /// Neither the secret nor the session id is rotated.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let token_hash = hash_opaque_secret(refresh_token);

        let session = SessionRepo::get_by_token_hash(&self.pool, &token_hash)
            .await
            .map_err(AuthError::Persistence)?
            .ok_or(AuthError::Unauthorized(UnauthorizedKind::SessionUnknown))?;

        if session.is_revoked() {
            return Err(AuthError::Unauthorized(UnauthorizedKind::SessionRevoked));
        }
        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::Unauthorized(UnauthorizedKind::SessionExpired));
        }

        // Conditional on the session still being active, so a logout that
        // lands between the read and here wins.
        let touched = SessionRepo::touch_last_used(&self.pool, session.session_id)
            .await
            .map_err(AuthError::Persistence)?;
        if !touched {
            return Err(AuthError::Unauthorized(UnauthorizedKind::SessionRevoked));
        }

        let user = UserRepo::get_by_id(&self.pool, session.user_id)
            .await
            .map_err(AuthError::Persistence)?
            .ok_or(AuthError::Unauthorized(UnauthorizedKind::SessionUnknown))?;

        self.tokens
            .issue_access_token(user.id, &user.email, &user.username, session.session_id)
    }

    /// Revoke an active session. Sessions already revoked or expired are
    /// reported as [`AuthError::NotFound`].
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        let revoked = SessionRepo::revoke(&self.pool, session_id)
            .await
            .map_err(AuthError::Persistence)?;
        if !revoked {
            return Err(AuthError::NotFound);
        }
        tracing::info!("Session {} logged out", session_id);
        Ok(())
    }

    /// Public views of a user's active sessions, most recently used first.
    pub async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionView>, AuthError> {
        let rows = SessionRepo::list_active_for_user(&self.pool, user_id)
            .await
            .map_err(AuthError::Persistence)?;
        Ok(rows.iter().map(|s| s.view()).collect())
    }
}
