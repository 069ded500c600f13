//! Password hashing, login verification and account registration.

use crate::error::AuthError;
use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sesame_db::{DuplicateKey, UserRepo, UserRow};
use sqlx::PgPool;
use uuid::Uuid;

/// Hash a password using argon2id
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a hash. A mismatch is `Ok(false)`; only a
/// corrupt hash or a primitive failure is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hashing(e.to_string())),
    }
}

/// Check a login attempt against the stored hash, if there is one.
///
/// A fresh hash of the supplied password is computed on every call and, when
/// the account does not exist, verified against. Both failure modes then pay
/// for one hash and one verification, so response time does not reveal
/// whether the email is registered.
pub fn verify_login(stored_hash: Option<&str>, password: &str) -> Result<bool, AuthError> {
    let dummy = hash_password(password)?;
    match stored_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            // Always matches; the result is discarded.
            verify_password(password, &dummy)?;
            Ok(false)
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Hashing(format!("hashing task failed: {}", e)))?
}

/// Resolve an email/password pair to a user. Unknown email and wrong
/// password both come back as [`AuthError::InvalidCredentials`].
#[tracing::instrument(skip(pool, password))]
pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<UserRow, AuthError> {
    let user = UserRepo::get_by_email(pool, email)
        .await
        .map_err(AuthError::Persistence)?;

    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let password = password.to_string();
    let matched = run_blocking(move || verify_login(stored_hash.as_deref(), &password)).await?;

    match user {
        Some(user) if matched => Ok(user),
        _ => Err(AuthError::InvalidCredentials),
    }
}

/// Create an account. A taken email is [`AuthError::DuplicateIdentity`] and
/// leaves the existing account untouched.
#[tracing::instrument(skip(pool, password))]
pub async fn register(
    pool: &PgPool,
    email: &str,
    username: &str,
    password: &str,
) -> Result<UserRow, AuthError> {
    let password = password.to_string();
    let password_hash = run_blocking(move || hash_password(&password)).await?;

    match UserRepo::create(pool, email, username, &password_hash).await {
        Ok(user) => {
            tracing::info!("Registered user {}", user.id);
            Ok(user)
        }
        Err(e) if e.downcast_ref::<DuplicateKey>().is_some() => Err(AuthError::DuplicateIdentity),
        Err(e) => Err(AuthError::Persistence(e)),
    }
}

/// Replace a user's password and revoke every session they hold, so stolen
/// refresh secrets stop working along with the old password.
#[tracing::instrument(skip(pool, new_password))]
pub async fn change_password(
    pool: &PgPool,
    user_id: Uuid,
    new_password: &str,
) -> Result<u64, AuthError> {
    let password = new_password.to_string();
    let password_hash = run_blocking(move || hash_password(&password)).await?;

    let revoked = UserRepo::replace_password_hash(pool, user_id, &password_hash)
        .await
        .map_err(AuthError::Persistence)?
        .ok_or(AuthError::NotFound)?;
    tracing::info!("Password changed for user {}, revoked {} session(s)", user_id, revoked);
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_password_hash_and_verify_correct() {
        let password = "my-secure-password";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
    }

    #[test]
    fn test_password_verify_wrong() {
        let hash = hash_password("correct-password").unwrap();
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_password_different_salts() {
        let password = "same-password";
        let hash1 = hash_password(password).unwrap();
        let hash2 = hash_password(password).unwrap();
        assert_ne!(hash1, hash2);
        // Both still verify
        assert!(verify_password(password, &hash1).unwrap());
        assert!(verify_password(password, &hash2).unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        let result = verify_password("anything", "not-a-phc-string");
        assert!(matches!(result, Err(AuthError::Hashing(_))));
    }

    #[test]
    fn test_verify_login_outcomes() {
        let hash = hash_password("longpassword1").unwrap();
        assert!(verify_login(Some(&hash), "longpassword1").unwrap());
        assert!(!verify_login(Some(&hash), "wrong").unwrap());
        // Unknown account never matches, even though the dummy hash would
        assert!(!verify_login(None, "longpassword1").unwrap());
    }

    fn median(mut samples: Vec<Duration>) -> Duration {
        samples.sort();
        samples[samples.len() / 2]
    }

    #[test]
    fn test_unknown_account_costs_the_same_as_wrong_password() {
        let hash = hash_password("the-real-password").unwrap();
        let trials = 7;

        let mut unknown = Vec::with_capacity(trials);
        let mut wrong = Vec::with_capacity(trials);
        for _ in 0..trials {
            let start = Instant::now();
            verify_login(None, "guess-password").unwrap();
            unknown.push(start.elapsed());

            let start = Instant::now();
            verify_login(Some(&hash), "guess-password").unwrap();
            wrong.push(start.elapsed());
        }

        let (unknown, wrong) = (median(unknown), median(wrong));
        let ratio = unknown.as_secs_f64() / wrong.as_secs_f64();
        assert!(
            (0.5..2.0).contains(&ratio),
            "timing gap between unknown email ({:?}) and wrong password ({:?})",
            unknown,
            wrong
        );
    }
}
