//! Onboarding endpoints, all behind `Authorization: Bearer`.
//!
//! OTT selection and the survey replace whatever was stored before, so a
//! client can safely resubmit a step.

use super::{
    error_response, require_auth,
    types::{
        OnboardingProgressResponse, OnboardingStatus, OttSelection, StatusResponse,
        SurveySubmission,
    },
};
use crate::registration::{OnboardingState, Registration};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

fn status_body(state: OnboardingState) -> Response {
    (
        StatusCode::OK,
        Json(OnboardingStatus {
            user_id: state.user_id,
            onboarding_completed: state.onboarding_completed,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/onboarding/ott",
    request_body = OttSelection,
    responses(
        (status = 200, description = "Subscriptions replaced", body = StatusResponse),
        (status = 400, description = "Unknown provider id"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
#[instrument(skip(headers, registration, payload))]
pub async fn select_ott(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
    payload: Option<Json<OttSelection>>,
) -> Response {
    let user = match require_auth(&headers, &registration).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };
    let Some(Json(selection)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match registration
        .select_ott(user.user_id, &selection.provider_ids)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(StatusResponse::ok())).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/onboarding/survey",
    request_body = SurveySubmission,
    responses(
        (status = 200, description = "Survey answers replaced", body = StatusResponse),
        (status = 400, description = "Empty survey or unknown movie id"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
#[instrument(skip(headers, registration, payload))]
pub async fn submit_survey(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
    payload: Option<Json<SurveySubmission>>,
) -> Response {
    let user = match require_auth(&headers, &registration).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };
    let Some(Json(submission)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match registration
        .submit_survey(user.user_id, &submission.movie_ids)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(StatusResponse::ok())).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/onboarding/complete",
    responses(
        (status = 200, description = "Onboarding marked complete", body = OnboardingStatus),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
#[instrument(skip(headers, registration))]
pub async fn complete_onboarding(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
) -> Response {
    let user = match require_auth(&headers, &registration).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };

    match registration.complete_onboarding(user.user_id).await {
        Ok(state) => status_body(state),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/onboarding/skip",
    responses(
        (status = 200, description = "Current onboarding flag, unchanged", body = OnboardingStatus),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
#[instrument(skip(headers, registration))]
pub async fn skip_onboarding(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
) -> Response {
    let user = match require_auth(&headers, &registration).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };

    match registration.skip_onboarding(user.user_id).await {
        Ok(state) => status_body(state),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/onboarding/progress",
    responses(
        (status = 200, description = "Onboarding flag and stored selections", body = OnboardingProgressResponse),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn onboarding_progress(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
) -> Response {
    let user = match require_auth(&headers, &registration).await {
        Ok(user) => user,
        Err(rejection) => return rejection.into_response(),
    };

    match registration.onboarding_progress(user.user_id).await {
        Ok(progress) => (
            StatusCode::OK,
            Json(OnboardingProgressResponse {
                user_id: progress.user_id,
                onboarding_completed: progress.onboarding_completed,
                provider_ids: progress.provider_ids,
                movie_ids: progress.movie_ids,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
