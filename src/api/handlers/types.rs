use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("nickname", &self.nickname)
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequestResponse {
    pub email: String,
    /// Seconds until the code expires.
    pub expires_in: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupCode {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub verified: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmResponse {
    pub user_id: Uuid,
    pub email: String,
    pub onboarding_completed: bool,
    pub token: AccessToken,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OttSelection {
    pub provider_ids: Vec<i32>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SurveySubmission {
    pub movie_ids: Vec<i32>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OnboardingStatus {
    pub user_id: Uuid,
    pub onboarding_completed: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OnboardingProgressResponse {
    pub user_id: Uuid,
    pub onboarding_completed: bool,
    pub provider_ids: Vec<i32>,
    pub movie_ids: Vec<i32>,
}
