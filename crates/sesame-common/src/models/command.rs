use crate::models::auth::SessionView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub remember_me: bool,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateInput {
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshInput {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutInput {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub current_session: SessionView,
    pub other_sessions: Vec<SessionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidationResponse {
    pub id: String,
    pub email: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
}

/// Uniform reply wrapper: a numeric status plus either success data or
/// error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(status: u16, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(_) => {
                return Self {
                    status: 500,
                    data: serde_json::Value::String("internal server error".to_string()),
                }
            }
        };
        Self { status, data }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
