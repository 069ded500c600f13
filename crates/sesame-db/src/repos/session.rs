use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sesame_common::models::auth::SessionView;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::classify;

/// Session row from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub device_name: String,
    pub device_type: String,
    pub remember_me: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl SessionRow {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id,
            device_name: self.device_name.clone(),
            device_type: self.device_type.clone(),
            last_used_at: self.last_used_at,
        }
    }
}

/// New session for creation. `created_at`/`last_used_at` are stamped by the
/// database when the row is written.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub device_name: String,
    pub device_type: String,
    pub remember_me: bool,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

/// Result of [`SessionRepo::create_and_prune`].
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: SessionRow,
    /// The owner's other sessions still active after pruning, most recently
    /// used first.
    pub others: Vec<SessionRow>,
    /// How many sessions the cap revoked.
    pub pruned: u64,
}

const SESSION_COLUMNS: &str = "session_id, token_hash, user_id, device_name, device_type, \
     remember_me, created_at, expires_at, last_used_at, revoked_at, ip_address, user_agent";

/// Repository for session operations
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session and enforce the per-user cap in one transaction.
    ///
    /// The owning user row is locked first, so concurrent logins for the same
    /// user are serialised and each prune sees every previously committed
    /// insert. Timestamps use `clock_timestamp()` rather than `NOW()` so a
    /// transaction that waited on the lock still stamps its session as the
    /// newest one.
    pub async fn create_and_prune(
        pool: &PgPool,
        new: &NewSession,
        max_active: i64,
    ) -> Result<CreatedSession> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new.user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock user row")?
            .context("Session owner does not exist")?;

        let session = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO sessions
                (session_id, token_hash, user_id, device_name, device_type, remember_me,
                 expires_at, ip_address, user_agent, created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, clock_timestamp(), clock_timestamp())
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(new.session_id)
        .bind(&new.token_hash)
        .bind(new.user_id)
        .bind(&new.device_name)
        .bind(&new.device_type)
        .bind(new.remember_me)
        .bind(new.expires_at)
        .bind(new.ip_address.as_deref())
        .bind(&new.user_agent)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, "Failed to insert session"))?;

        let pruned = sqlx::query(
            r#"
            UPDATE sessions SET revoked_at = clock_timestamp()
            WHERE session_id IN (
                SELECT session_id FROM sessions
                WHERE user_id = $1
                  AND revoked_at IS NULL
                  AND expires_at > clock_timestamp()
                ORDER BY last_used_at DESC, session_id DESC
                OFFSET $2
                FOR UPDATE
            )
            "#,
        )
        .bind(new.user_id)
        .bind(max_active)
        .execute(&mut *tx)
        .await
        .context("Failed to prune sessions")?
        .rows_affected();

        let others = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE user_id = $1
              AND session_id != $2
              AND revoked_at IS NULL
              AND expires_at > clock_timestamp()
            ORDER BY last_used_at DESC
            "#
        ))
        .bind(new.user_id)
        .bind(new.session_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list other sessions")?;

        tx.commit().await.context("Failed to commit session")?;

        Ok(CreatedSession {
            session,
            others,
            pruned,
        })
    }

    /// Get a session by id, only if it is still active.
    pub async fn get_active_by_id(pool: &PgPool, session_id: Uuid) -> Result<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1 AND revoked_at IS NULL AND expires_at > NOW()"
        ))
        .bind(session_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?;
        Ok(row)
    }

    /// Get a session by refresh-token hash regardless of state, so callers can
    /// tell revoked from expired.
    pub async fn get_by_token_hash(pool: &PgPool, token_hash: &str) -> Result<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by token hash")?;
        Ok(row)
    }

    /// Bump `last_used_at`. Returns false if the session is no longer active.
    pub async fn touch_last_used(pool: &PgPool, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET last_used_at = clock_timestamp() WHERE session_id = $1 AND revoked_at IS NULL AND expires_at > NOW()",
        )
        .bind(session_id)
        .execute(pool)
        .await
        .context("Failed to update session last_used_at")?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke an active session. Returns false if it was already revoked,
    /// expired or never existed.
    pub async fn revoke(pool: &PgPool, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW() WHERE session_id = $1 AND revoked_at IS NULL AND expires_at > NOW()",
        )
        .bind(session_id)
        .execute(pool)
        .await
        .context("Failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()",
        )
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to revoke sessions for user")?;
        Ok(result.rows_affected())
    }

    /// Active sessions for a user, most recently used first.
    pub async fn list_active_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            ORDER BY last_used_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list active sessions")?;
        Ok(rows)
    }

    /// Delete sessions that were revoked, or expired, before `cutoff`.
    pub async fn purge_dead(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE revoked_at < $1 OR expires_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await
        .context("Failed to purge dead sessions")?;
        Ok(result.rows_affected())
    }
}
