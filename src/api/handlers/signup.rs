//! Signup endpoints: request a code, optionally pre-check it, confirm it.
//!
//! Flow Overview:
//! 1) `POST /auth/signup/request` stages a pending signup and mails a code.
//! 2) `POST /auth/signup/verify` checks the code without consuming it.
//! 3) `POST /auth/signup/confirm` creates the user and returns a bearer token.

use super::{
    error_response, normalize_email,
    types::{
        AccessToken, ConfirmResponse, SignupCode, SignupRequest, SignupRequestResponse,
        VerifyResponse,
    },
    valid_email, valid_nickname, valid_password,
};
use crate::registration::{Registration, TOKEN_TYPE};
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument};

fn missing_payload() -> Response {
    (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response()
}

fn validate_code_payload(payload: &SignupCode) -> Result<String, Response> {
    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return Err((StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response());
    }
    if payload.code.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing code".to_string()).into_response());
    }
    Ok(email)
}

#[utoipa::path(
    post,
    path = "/auth/signup/request",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Pending signup staged and code sent", body = SignupRequestResponse),
        (status = 400, description = "Invalid email, password or nickname"),
        (status = 409, description = "Email is already registered"),
        (status = 503, description = "Storage unavailable"),
    ),
    tag = "signup"
)]
#[instrument(skip(registration, payload))]
pub async fn request_signup(
    registration: Extension<Arc<Registration>>,
    payload: Option<Json<SignupRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    debug!("signup request: {:?}", request);

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if !valid_password(&request.password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".to_string(),
        )
            .into_response();
    }
    if !valid_nickname(&request.nickname) {
        return (
            StatusCode::BAD_REQUEST,
            "Nickname must be 1 to 30 characters".to_string(),
        )
            .into_response();
    }

    match registration
        .request_signup(&email, &request.password, request.nickname.trim())
        .await
    {
        Ok(requested) => (
            StatusCode::OK,
            Json(SignupRequestResponse {
                email: requested.email,
                expires_in: requested.expires_in,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/signup/verify",
    request_body = SignupCode,
    responses(
        (status = 200, description = "Whether the code matches; the code is not consumed", body = VerifyResponse),
        (status = 400, description = "No pending signup for this email, or it expired"),
    ),
    tag = "signup"
)]
#[instrument(skip(registration, payload))]
pub async fn verify_signup(
    registration: Extension<Arc<Registration>>,
    payload: Option<Json<SignupCode>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    let email = match validate_code_payload(&request) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match registration.verify_code(&email, request.code.trim()).await {
        Ok(verified) => (StatusCode::OK, Json(VerifyResponse { verified })).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/signup/confirm",
    request_body = SignupCode,
    responses(
        (status = 200, description = "User created", body = ConfirmResponse),
        (status = 400, description = "No pending signup, expired, or wrong code"),
        (status = 409, description = "Email is already registered"),
        (status = 503, description = "Storage unavailable"),
    ),
    tag = "signup"
)]
#[instrument(skip(registration, payload))]
pub async fn confirm_signup(
    registration: Extension<Arc<Registration>>,
    payload: Option<Json<SignupCode>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    let email = match validate_code_payload(&request) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match registration.confirm_signup(&email, request.code.trim()).await {
        Ok(confirmed) => (
            StatusCode::OK,
            Json(ConfirmResponse {
                user_id: confirmed.user_id,
                email: confirmed.email,
                onboarding_completed: confirmed.onboarding_completed,
                token: AccessToken {
                    access_token: confirmed.access_token,
                    token_type: TOKEN_TYPE.to_string(),
                },
            }),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
