use thiserror::Error;

/// Failures surfaced by the registration workflow.
///
/// Store-level failures are collapsed into [`RegistrationError::Unavailable`];
/// nothing is retried internally.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Email is already registered")]
    DuplicateEmail,
    /// Covers both "never requested" and "expired".
    #[error("No pending signup for this email, or the code has expired")]
    NoPendingSignup,
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Survey requires at least one movie")]
    EmptySurvey,
    #[error("Unknown provider or movie id")]
    UnknownReference,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid or expired token")]
    Unauthenticated,
    #[error("Storage unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}
