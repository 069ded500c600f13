//! Field-level checks for inbound command payloads.
//!
//! Each `validate_*` function returns a map of field name to the first rule
//! that field broke. An empty map means the input is acceptable.

use crate::models::command::{LoginInput, LogoutInput, RefreshInput, RegisterInput, ValidateInput};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use uuid::Uuid;

pub type FieldErrors = BTreeMap<String, String>;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is valid")
});

pub const PASSWORD_MIN_BYTES: usize = 8;
pub const PASSWORD_MAX_BYTES: usize = 72;
pub const USERNAME_MIN_CHARS: usize = 4;
pub const USERNAME_MAX_CHARS: usize = 100;

#[derive(Debug, Default)]
struct Validator {
    errors: FieldErrors,
}

impl Validator {
    fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors
                .entry(field.to_string())
                .or_insert_with(|| message.to_string());
        }
    }

    fn required(&mut self, value: &str, field: &str) {
        self.check(!value.is_empty(), field, "must be provided");
    }

    fn finish(self) -> FieldErrors {
        self.errors
    }
}

fn check_email(v: &mut Validator, email: &str) {
    v.required(email, "email");
    v.check(EMAIL_RX.is_match(email), "email", "must be a valid address");
}

fn check_password(v: &mut Validator, password: &str) {
    v.required(password, "password");
    v.check(
        password.len() >= PASSWORD_MIN_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= PASSWORD_MAX_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_register(input: &RegisterInput) -> FieldErrors {
    let mut v = Validator::default();
    check_email(&mut v, &input.email);
    check_password(&mut v, &input.password);

    let username_len = input.username.chars().count();
    v.required(&input.username, "username");
    v.check(
        username_len >= USERNAME_MIN_CHARS,
        "username",
        "must not be less than 4 characters",
    );
    v.check(
        username_len <= USERNAME_MAX_CHARS,
        "username",
        "must not be more than 100 characters",
    );
    v.finish()
}

/// Login only checks presence and shape. Password length rules are not
/// applied here so a policy change never locks out existing accounts.
pub fn validate_login(input: &LoginInput) -> FieldErrors {
    let mut v = Validator::default();
    check_email(&mut v, &input.email);
    v.required(&input.password, "password");
    v.check(
        input.password.len() <= PASSWORD_MAX_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
    v.required(&input.device_name, "device_name");
    v.required(&input.device_type, "device_type");
    v.finish()
}

pub fn validate_access_token(input: &ValidateInput) -> FieldErrors {
    let mut v = Validator::default();
    v.required(&input.access_token, "access_token");
    v.finish()
}

pub fn validate_refresh_token(input: &RefreshInput) -> FieldErrors {
    let mut v = Validator::default();
    v.required(&input.refresh_token, "refresh_token");
    v.finish()
}

/// Logout needs a well-formed session id; on success it is returned parsed.
pub fn validate_logout(input: &LogoutInput) -> Result<Uuid, FieldErrors> {
    let mut v = Validator::default();
    v.required(&input.session_id, "session_id");
    let parsed = Uuid::parse_str(&input.session_id).ok();
    v.check(parsed.is_some(), "session_id", "must be a valid session id");
    parsed.ok_or_else(|| v.finish())
}
