//! Typed outcomes of the auth core and their mapping to reply envelopes.
//!
//! Every failure path produces exactly one [`AuthError`]. The dispatcher
//! turns it into a status code plus a message that is safe to show a client;
//! infrastructure detail is logged here and never leaves the process.

use sesame_common::models::command::Envelope;
use sesame_common::validation::FieldErrors;
use thiserror::Error;

/// Why a token or session could not be used.
///
/// The session variants are only told apart in logs. Externally they all
/// read as "invalid token" so a caller cannot probe which refresh secrets
/// once existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedKind {
    /// Structurally invalid, bad signature, or not yet valid.
    TokenInvalid,
    /// Signature expired, or the session behind a valid signature is dead.
    TokenExpired,
    SessionUnknown,
    SessionRevoked,
    SessionExpired,
}

impl UnauthorizedKind {
    pub fn public_message(self) -> &'static str {
        match self {
            UnauthorizedKind::TokenExpired => "token expired",
            UnauthorizedKind::TokenInvalid
            | UnauthorizedKind::SessionUnknown
            | UnauthorizedKind::SessionRevoked
            | UnauthorizedKind::SessionExpired => "invalid token",
        }
    }
}

/// Failure kinds from access-token validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed or its signature does not match")]
    Malformed,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token has expired")]
    Expired,
    #[error("token could not be validated: {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("input failed validation")]
    Validation(FieldErrors),

    #[error("payload is not valid JSON for this command")]
    MalformedPayload,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email is already in use")]
    DuplicateIdentity,

    #[error("unauthorized: {0:?}")]
    Unauthorized(UnauthorizedKind),

    #[error("session not found")]
    NotFound,

    #[error("unknown command subject: {0}")]
    UnknownCommand(String),

    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("secure random source unavailable: {0}")]
    Entropy(String),

    #[error("failed to sign access token: {0}")]
    Signing(String),

    #[error("token validation failed unexpectedly: {0}")]
    TokenValidation(String),

    #[error("command did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::NotYetValid => {
                AuthError::Unauthorized(UnauthorizedKind::TokenInvalid)
            }
            TokenError::Expired => AuthError::Unauthorized(UnauthorizedKind::TokenExpired),
            TokenError::Unknown(detail) => AuthError::TokenValidation(detail),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> u16 {
        match self {
            AuthError::Validation(_) | AuthError::MalformedPayload | AuthError::UnknownCommand(_) => 422,
            AuthError::InvalidCredentials | AuthError::Unauthorized(_) => 401,
            AuthError::DuplicateIdentity => 409,
            AuthError::NotFound => 404,
            AuthError::Persistence(_)
            | AuthError::Hashing(_)
            | AuthError::Entropy(_)
            | AuthError::Signing(_)
            | AuthError::TokenValidation(_)
            | AuthError::Timeout(_) => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() >= 500
    }

    /// Build the reply for this error. Internal errors are logged with full
    /// detail and collapsed to one generic message.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            AuthError::Validation(fields) => Envelope::new(self.status(), fields),
            AuthError::MalformedPayload => Envelope::new(self.status(), "unprocessable entity"),
            AuthError::InvalidCredentials => Envelope::new(self.status(), "invalid credentials"),
            AuthError::DuplicateIdentity => Envelope::new(self.status(), "email is already in use"),
            AuthError::Unauthorized(kind) => {
                tracing::debug!("Rejected as unauthorized: {:?}", kind);
                Envelope::new(self.status(), kind.public_message())
            }
            AuthError::NotFound => Envelope::new(self.status(), "session not found"),
            AuthError::UnknownCommand(_) => Envelope::new(self.status(), "invalid subject"),
            _ => {
                tracing::error!("{}", self);
                Envelope::new(500, "internal server error")
            }
        }
    }
}
