use crate::error::classify;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub activated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, activated, created_at, updated_at";

pub struct UserRepo;

impl UserRepo {
    /// Insert a user. A taken email fails with [`crate::DuplicateKey`] and
    /// leaves the existing row untouched.
    pub async fn create(
        pool: &PgPool,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, username, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| classify(e, "Failed to create user"))
    }

    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;
        Ok(row)
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by id")?;
        Ok(row)
    }

    /// Overwrite the mutable columns of a user. Returns false if no such user.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        username: &str,
        activated: bool,
        password_hash: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET username = $1, activated = $2, password_hash = $3, updated_at = NOW() WHERE id = $4",
        )
        .bind(username)
        .bind(activated)
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user")?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace a user's password hash and revoke every active session they
    /// hold, in one transaction. Returns `None` if no such user, otherwise
    /// how many sessions were revoked.
    ///
    /// The user row is locked first, the same lock `SessionRepo::create_and_prune`
    /// takes, so a login committing concurrently is either revoked here or
    /// starts after the new hash is visible.
    pub async fn replace_password_hash(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<u64>> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        let locked = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock user row")?;
        if locked.is_none() {
            return Ok(None);
        }

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update password hash")?;

        let revoked = sqlx::query(
            "UPDATE sessions SET revoked_at = clock_timestamp() WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > clock_timestamp()",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to revoke sessions for user")?
        .rows_affected();

        tx.commit().await.context("Failed to commit password change")?;
        Ok(Some(revoked))
    }
}
