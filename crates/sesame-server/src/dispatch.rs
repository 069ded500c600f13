//! Routes an inbound command to exactly one core operation and wraps the
//! outcome in an [`Envelope`].

use crate::credentials;
use crate::error::AuthError;
use crate::sessions::DeviceInfo;
use crate::state::AppState;
use serde::de::DeserializeOwned;
use sesame_common::models::command::{
    Envelope, LoginInput, LoginResponse, LogoutInput, RefreshInput, RegisterInput,
    TokenRefreshResponse, TokenValidationResponse, ValidateInput,
};
use sesame_common::validation::{
    validate_access_token, validate_login, validate_logout, validate_refresh_token,
    validate_register, FieldErrors,
};
use std::fmt;
use std::str::FromStr;

/// Subject namespace the service answers on.
pub const SUBJECT_PREFIX: &str = "auth.";

/// Every command the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Healthcheck,
    Register,
    Login,
    Validate,
    Refresh,
    Logout,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Healthcheck => "healthcheck",
            Command::Register => "register",
            Command::Login => "login",
            Command::Validate => "validate",
            Command::Refresh => "refresh",
            Command::Logout => "logout",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SUBJECT_PREFIX, self.name())
    }
}

impl FromStr for Command {
    type Err = AuthError;

    /// Accepts `auth.<name>` or a bare `<name>`.
    fn from_str(subject: &str) -> Result<Self, Self::Err> {
        let name = subject.strip_prefix(SUBJECT_PREFIX).unwrap_or(subject);
        match name {
            "healthcheck" => Ok(Command::Healthcheck),
            "register" => Ok(Command::Register),
            "login" => Ok(Command::Login),
            "validate" => Ok(Command::Validate),
            "refresh" => Ok(Command::Refresh),
            "logout" => Ok(Command::Logout),
            _ => Err(AuthError::UnknownCommand(subject.to_string())),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, AuthError> {
    serde_json::from_slice(payload).map_err(|_| AuthError::MalformedPayload)
}

fn ensure_valid(errors: FieldErrors) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors))
    }
}

/// Handle one command end to end. Never fails: every error becomes an
/// envelope carrying its status.
#[tracing::instrument(skip(state, payload), fields(command = tracing::field::Empty))]
pub async fn dispatch(state: &AppState, subject: &str, payload: &[u8]) -> Envelope {
    let command = match subject.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!("Rejected command: {}", e);
            return e.to_envelope();
        }
    };
    tracing::Span::current().record("command", command.name());

    let timeout = state.command_timeout();
    let outcome = match tokio::time::timeout(timeout, run(state, command, payload)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AuthError::Timeout(timeout)),
    };

    outcome.unwrap_or_else(|e| e.to_envelope())
}

async fn run(state: &AppState, command: Command, payload: &[u8]) -> Result<Envelope, AuthError> {
    match command {
        Command::Healthcheck => Ok(Envelope::new(200, "auth up and running")),
        Command::Register => register(state, decode(payload)?).await,
        Command::Login => login(state, decode(payload)?).await,
        Command::Validate => validate(state, decode(payload)?).await,
        Command::Refresh => refresh(state, decode(payload)?).await,
        Command::Logout => logout(state, decode(payload)?).await,
    }
}

#[tracing::instrument(skip_all)]
async fn register(state: &AppState, input: RegisterInput) -> Result<Envelope, AuthError> {
    ensure_valid(validate_register(&input))?;
    credentials::register(&state.pool, &input.email, &input.username, &input.password).await?;
    Ok(Envelope::new(201, "user successfully created"))
}

#[tracing::instrument(skip_all)]
async fn login(state: &AppState, input: LoginInput) -> Result<Envelope, AuthError> {
    ensure_valid(validate_login(&input))?;
    let user = credentials::authenticate(&state.pool, &input.email, &input.password).await?;

    let device = DeviceInfo {
        device_name: input.device_name,
        device_type: input.device_type,
        remember_me: input.remember_me,
        ip_address: Some(input.ip_address),
        user_agent: input.user_agent,
    };
    let outcome = state.sessions.login(&user, device).await?;

    Ok(Envelope::new(
        200,
        LoginResponse {
            access_token: outcome.access_token,
            refresh_token: outcome.refresh_token,
            current_session: outcome.current_session,
            other_sessions: outcome.other_sessions,
        },
    ))
}

#[tracing::instrument(skip_all)]
async fn validate(state: &AppState, input: ValidateInput) -> Result<Envelope, AuthError> {
    ensure_valid(validate_access_token(&input))?;
    let claims = state.sessions.validate_access(&input.access_token).await?;
    Ok(Envelope::new(
        200,
        TokenValidationResponse {
            id: claims.user_id,
            email: claims.email,
            username: claims.username,
        },
    ))
}

#[tracing::instrument(skip_all)]
async fn refresh(state: &AppState, input: RefreshInput) -> Result<Envelope, AuthError> {
    ensure_valid(validate_refresh_token(&input))?;
    let access_token = state.sessions.refresh(&input.refresh_token).await?;
    Ok(Envelope::new(200, TokenRefreshResponse { access_token }))
}

#[tracing::instrument(skip_all)]
async fn logout(state: &AppState, input: LogoutInput) -> Result<Envelope, AuthError> {
    let session_id = validate_logout(&input).map_err(AuthError::Validation)?;
    state.sessions.logout(session_id).await?;
    Ok(Envelope::new(200, "user successfully logged out"))
}
