use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access token claims.
///
/// `aud` is a list to match the registered-claims shape other services
/// decode with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub session_id: String,
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Public view of a session. Never carries the token hash or client IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub device_name: String,
    pub device_type: String,
    pub last_used_at: DateTime<Utc>,
}
