//! API handlers and shared request helpers.
//!
//! Handlers stay thin: validate and normalize input here, delegate to
//! [`Registration`], and map its errors to status codes in one place.

pub mod catalog;
pub mod health;
pub mod onboarding;
pub mod root;
pub mod signup;
pub mod types;

use crate::registration::{Registration, RegistrationError, User};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use regex::Regex;
use std::sync::OnceLock;
use tracing::error;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_NICKNAME_CHARS: usize = 30;

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

/// Lightweight email sanity check run before anything touches a store.
pub fn valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_CHARS
}

/// 1 to 30 characters, counted as chars rather than bytes.
pub fn valid_nickname(nickname: &str) -> bool {
    let chars = nickname.trim().chars().count();
    (1..=MAX_NICKNAME_CHARS).contains(&chars)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Map a workflow error to the status and message sent to the client.
pub fn error_response(err: &RegistrationError) -> (StatusCode, String) {
    let status = match err {
        RegistrationError::DuplicateEmail => StatusCode::CONFLICT,
        RegistrationError::NoPendingSignup
        | RegistrationError::InvalidCode
        | RegistrationError::EmptySurvey
        | RegistrationError::UnknownReference => StatusCode::BAD_REQUEST,
        RegistrationError::Unauthenticated => StatusCode::UNAUTHORIZED,
        RegistrationError::UserNotFound => StatusCode::NOT_FOUND,
        RegistrationError::Unavailable(source) => {
            error!("Store unavailable: {source:#}");
            StatusCode::SERVICE_UNAVAILABLE
        }
        RegistrationError::Internal(source) => {
            error!("Internal error: {source:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the bearer token to an active user, or answer 401.
pub async fn require_auth(
    headers: &HeaderMap,
    registration: &Registration,
) -> Result<User, (StatusCode, String)> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Missing bearer token".to_string(),
        ));
    };
    registration
        .authenticate(token)
        .await
        .map_err(|err| error_response(&err))
}
