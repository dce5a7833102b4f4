use super::{error_response, require_auth};
use crate::registration::{OnboardingCandidate, OttProvider, Registration};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/onboarding/providers",
    responses(
        (status = 200, description = "OTT providers offered on the selection screen", body = [OttProvider]),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn list_providers(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
) -> Response {
    if let Err(rejection) = require_auth(&headers, &registration).await {
        return rejection.into_response();
    }

    match registration.list_providers().await {
        Ok(providers) => (StatusCode::OK, Json(providers)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/onboarding/candidates",
    responses(
        (status = 200, description = "Survey posters in display order", body = [OnboardingCandidate]),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn list_candidates(
    headers: HeaderMap,
    registration: Extension<Arc<Registration>>,
) -> Response {
    if let Err(rejection) = require_auth(&headers, &registration).await {
        return rejection.into_response();
    }

    match registration.list_candidates().await {
        Ok(candidates) => (StatusCode::OK, Json(candidates)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
