//! Access-token signing/validation and opaque refresh secrets.

use crate::config::AuthConfig;
use crate::error::{AuthError, TokenError};
use anyhow::{bail, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sesame_common::models::auth::Claims;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Shortest HS512 secret accepted at startup.
pub const MIN_SECRET_BYTES: usize = 32;

/// Random bytes in an opaque refresh secret.
pub const OPAQUE_SECRET_BYTES: usize = 32;

/// Signs and validates access tokens with one process-wide HMAC key.
///
/// Built once at startup and shared behind `Arc`; there is no way to swap
/// the key on a live instance. The `kid` header names the key so a future
/// rotation scheme can pick the right one.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    key_id: String,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        key_id: &str,
        issuer: &str,
        audience: &str,
        ttl: Duration,
    ) -> Result<Self> {
        if secret.len() < MIN_SECRET_BYTES {
            bail!(
                "JWT secret must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                secret.len()
            );
        }

        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "aud", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            key_id: key_id.to_string(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(
            config.jwt_secret.as_bytes(),
            &config.key_id,
            &config.issuer,
            &config.audience,
            Duration::seconds(config.access_token_ttl_secs as i64),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue an access token bound to a session, valid from now.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        username: &str,
        session_id: Uuid,
    ) -> Result<String, AuthError> {
        self.issue_access_token_at(user_id, email, username, session_id, Utc::now())
    }

    /// Issue an access token as if it were minted at `issued_at`.
    pub fn issue_access_token_at(
        &self,
        user_id: Uuid,
        email: &str,
        username: &str,
        session_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let iat = issued_at.timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            username: username.to_string(),
            session_id: session_id.to_string(),
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            aud: vec![self.audience.clone()],
            iat,
            nbf: iat,
            exp: iat + self.ttl.num_seconds(),
        };

        let mut header = Header::new(Algorithm::HS512);
        header.kid = Some(self.key_id.clone());

        jsonwebtoken::encode(&header, &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify signature and time claims. Says nothing about whether the
    /// session named in the claims is still alive.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Malformed,
                _ => TokenError::Unknown(e.to_string()),
            })
    }
}

/// Generate an opaque refresh secret: 32 bytes from the OS RNG, URL-safe
/// base64 with padding.
pub fn generate_opaque_secret() -> Result<String, AuthError> {
    let mut bytes = [0u8; OPAQUE_SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Entropy(e.to_string()))?;
    Ok(URL_SAFE.encode(bytes))
}

/// Hash an opaque secret using SHA256. Deterministic, so the digest doubles
/// as the lookup key.
pub fn hash_opaque_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-ensure-32-bytes-long-string!";

    fn service() -> TokenService {
        TokenService::new(
            SECRET.as_bytes(),
            "v1",
            "auth-service",
            "task-flow",
            Duration::minutes(10),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = svc
            .issue_access_token(user_id, "a@x.com", "alice", session_id)
            .unwrap();

        let claims = svc.validate_access_token(&token).unwrap();
        assert_eq!(claims.user_id, user_id.to_string());
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.session_id, session_id.to_string());
        assert_eq!(claims.iss, "auth-service");
        assert_eq!(claims.aud, vec!["task-flow".to_string()]);
        assert_eq!(claims.iat, claims.nbf);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn test_header_uses_hs512_and_key_id() {
        let svc = service();
        let token = svc
            .issue_access_token(Uuid::new_v4(), "a@x.com", "alice", Uuid::new_v4())
            .unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS512);
        assert_eq!(header.kid.as_deref(), Some("v1"));
    }

    #[test]
    fn test_expired_token() {
        let svc = service();
        let token = svc
            .issue_access_token_at(
                Uuid::new_v4(),
                "a@x.com",
                "alice",
                Uuid::new_v4(),
                Utc::now() - Duration::minutes(11),
            )
            .unwrap();
        assert_eq!(svc.validate_access_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let svc = service();
        let token = svc
            .issue_access_token_at(
                Uuid::new_v4(),
                "a@x.com",
                "alice",
                Uuid::new_v4(),
                Utc::now() + Duration::minutes(5),
            )
            .unwrap();
        assert_eq!(
            svc.validate_access_token(&token),
            Err(TokenError::NotYetValid)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let svc = service();
        assert_eq!(
            svc.validate_access_token("not-a-token"),
            Err(TokenError::Malformed)
        );
        assert_eq!(svc.validate_access_token(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_wrong_secret_is_malformed() {
        let other = TokenService::new(
            b"another-secret-that-is-also-32-bytes!!",
            "v1",
            "auth-service",
            "task-flow",
            Duration::minutes(10),
        )
        .unwrap();
        let token = other
            .issue_access_token(Uuid::new_v4(), "a@x.com", "alice", Uuid::new_v4())
            .unwrap();
        assert_eq!(
            service().validate_access_token(&token),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_wrong_audience_is_malformed() {
        let other = TokenService::new(
            SECRET.as_bytes(),
            "v1",
            "auth-service",
            "some-other-app",
            Duration::minutes(10),
        )
        .unwrap();
        let token = other
            .issue_access_token(Uuid::new_v4(), "a@x.com", "alice", Uuid::new_v4())
            .unwrap();
        assert_eq!(
            service().validate_access_token(&token),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: "u".into(),
            email: "a@x.com".into(),
            username: "alice".into(),
            session_id: "s".into(),
            iss: "auth-service".into(),
            sub: "u".into(),
            aud: vec!["task-flow".into()],
            iat: now,
            nbf: now,
            exp: now + 600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(
            service().validate_access_token(&token),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = TokenService::new(
            b"too-short",
            "v1",
            "auth-service",
            "task-flow",
            Duration::minutes(10),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_opaque_secret_shape() {
        let secret = generate_opaque_secret().unwrap();
        // 32 bytes -> 44 base64 chars including one '=' of padding
        assert_eq!(secret.len(), 44);
        assert!(secret.ends_with('='));
        assert!(!secret.contains('+') && !secret.contains('/'));
        assert_eq!(URL_SAFE.decode(&secret).unwrap().len(), 32);
    }

    #[test]
    fn test_opaque_secret_uniqueness() {
        let a = generate_opaque_secret().unwrap();
        let b = generate_opaque_secret().unwrap();
        assert_ne!(a, b);
        assert_ne!(hash_opaque_secret(&a), hash_opaque_secret(&b));
    }

    #[test]
    fn test_opaque_hash_determinism() {
        let secret = "fixed-token-value";
        assert_eq!(hash_opaque_secret(secret), hash_opaque_secret(secret));
        assert_eq!(hash_opaque_secret(secret).len(), 64);
    }
}
