//! Signup confirmation and onboarding workflow.
//!
//! Per email the signup lifecycle is:
//!
//! ```text
//! NoPendingSignup --request--> Pending --confirm--> Confirmed (user row exists)
//!                               |   ^
//!                               |   +-- re-request overwrites the code
//!                               +-- TTL --> NoPendingSignup
//! ```
//!
//! Confirmation is the only path that creates a user, and it is all or
//! nothing: the insert is staged in a transaction, the pending record is
//! deleted, and only then is the insert committed. The unique index on
//! `users.email` arbitrates concurrent confirmations.

pub mod accounts;
pub mod code;
mod error;
pub mod password;
pub mod pending;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use accounts::{
    AccountStore, InsertOutcome, OnboardingCandidate, OttProvider, PgAccountStore, ReplaceOutcome,
    StagedUser, SurveyAnswer, User,
};
pub use code::{CodeGenerator, RandomCodeGenerator};
pub use error::RegistrationError;
pub use pending::{MemoryPendingStore, PendingSignup, PendingSignupStore, RedisPendingStore};
pub use token::{TOKEN_TYPE, TokenIssuer};

use crate::mail::{Mailer, SignupCodeMessage};
use anyhow::anyhow;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_SIGNUP_TTL_SECONDS: u64 = 600;
/// One day.
pub const MAX_SIGNUP_TTL_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupRequested {
    pub email: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedSignup {
    pub user_id: Uuid,
    pub email: String,
    pub onboarding_completed: bool,
    pub access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingState {
    pub user_id: Uuid,
    pub onboarding_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingProgress {
    pub user_id: Uuid,
    pub onboarding_completed: bool,
    pub provider_ids: Vec<i32>,
    pub movie_ids: Vec<i32>,
}

/// Health of the two stores the workflow depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub accounts: bool,
    pub pending: bool,
}

impl StoreHealth {
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        self.accounts && self.pending
    }
}

/// The registration workflow with its collaborators injected.
pub struct Registration {
    pending: Arc<dyn PendingSignupStore>,
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    tokens: Arc<TokenIssuer>,
    codes: Arc<dyn CodeGenerator>,
    signup_ttl: Duration,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("tokens", &self.tokens)
            .field("signup_ttl", &self.signup_ttl)
            .finish_non_exhaustive()
    }
}

impl Registration {
    #[must_use]
    pub fn new(
        pending: Arc<dyn PendingSignupStore>,
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            pending,
            accounts,
            mailer,
            tokens,
            codes: Arc::new(RandomCodeGenerator),
            signup_ttl: Duration::from_secs(DEFAULT_SIGNUP_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    #[must_use]
    pub fn with_signup_ttl(mut self, ttl: Duration) -> Self {
        self.signup_ttl = ttl;
        self
    }

    /// Stage a pending signup and mail its code.
    ///
    /// A failed delivery is logged and the pending record is kept.
    ///
    /// # Errors
    /// [`RegistrationError::DuplicateEmail`] if a user already owns the email.
    #[instrument(skip(self, password, nickname))]
    pub async fn request_signup(
        &self,
        email: &str,
        password: &str,
        nickname: &str,
    ) -> Result<SignupRequested, RegistrationError> {
        if self
            .accounts
            .email_exists(email)
            .await
            .map_err(RegistrationError::Unavailable)?
        {
            debug!("signup requested for registered email");
            return Err(RegistrationError::DuplicateEmail);
        }

        let code = self.codes.generate();
        let password_hash = hash_in_background(password.to_string()).await?;

        let signup = PendingSignup {
            email: email.to_string(),
            password_hash,
            nickname: nickname.to_string(),
            code: code.clone(),
        };
        self.pending
            .put(&signup, self.signup_ttl)
            .await
            .map_err(RegistrationError::Unavailable)?;

        let message = SignupCodeMessage {
            to_email: email.to_string(),
            nickname: nickname.to_string(),
            code,
            expires_in_seconds: self.signup_ttl.as_secs(),
        };
        if let Err(err) = self.mailer.send_signup_code(&message).await {
            warn!("Failed to deliver signup code: {err:#}");
        }

        Ok(SignupRequested {
            email: email.to_string(),
            expires_in: self.signup_ttl.as_secs(),
        })
    }

    /// Check a code without consuming it.
    ///
    /// # Errors
    /// [`RegistrationError::NoPendingSignup`] if nothing is pending for the email.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<bool, RegistrationError> {
        let signup = self.load_pending(email).await?;
        Ok(signup.code == code)
    }

    /// Turn a pending signup into a user and mint its access token.
    ///
    /// # Errors
    /// [`RegistrationError::NoPendingSignup`], [`RegistrationError::InvalidCode`],
    /// [`RegistrationError::DuplicateEmail`], or `Unavailable` when a store fails.
    /// On any error no user has been created and the pending record is intact.
    #[instrument(skip(self, code))]
    pub async fn confirm_signup(
        &self,
        email: &str,
        code: &str,
    ) -> Result<ConfirmedSignup, RegistrationError> {
        let signup = self.load_pending(email).await?;
        if signup.code != code {
            return Err(RegistrationError::InvalidCode);
        }

        if self
            .accounts
            .email_exists(email)
            .await
            .map_err(RegistrationError::Unavailable)?
        {
            return Err(RegistrationError::DuplicateEmail);
        }

        let staged = match self
            .accounts
            .insert_user(email, &signup.password_hash)
            .await
            .map_err(RegistrationError::Unavailable)?
        {
            InsertOutcome::Staged(staged) => staged,
            InsertOutcome::Conflict => {
                debug!("unique email index rejected confirmation");
                return Err(RegistrationError::DuplicateEmail);
            }
        };
        let user = staged.user().clone();

        // Everything fallible runs before commit so nothing can fail after it.
        let access_token = match self.tokens.issue(user.user_id, Utc::now().timestamp()) {
            Ok(token) => token,
            Err(err) => {
                rollback(staged).await;
                return Err(RegistrationError::Internal(anyhow!(err)));
            }
        };

        if let Err(err) = self.pending.delete(email).await {
            rollback(staged).await;
            return Err(RegistrationError::Unavailable(err));
        }

        if let Err(err) = staged.commit().await {
            if let Err(restore) = self.pending.put(&signup, self.signup_ttl).await {
                warn!("Failed to restore pending signup after commit failure: {restore:#}");
            }
            return Err(RegistrationError::Unavailable(err));
        }

        info!(user_id = %user.user_id, "user created");

        Ok(ConfirmedSignup {
            user_id: user.user_id,
            email: user.email,
            onboarding_completed: user.onboarding_completed,
            access_token,
        })
    }

    /// Resolve a bearer token to an active user.
    ///
    /// # Errors
    /// [`RegistrationError::Unauthenticated`] for bad tokens and for missing or
    /// soft-deleted users.
    pub async fn authenticate(&self, token: &str) -> Result<User, RegistrationError> {
        let claims = self
            .tokens
            .verify(token, Utc::now().timestamp())
            .map_err(|err| {
                debug!("rejected access token: {err}");
                RegistrationError::Unauthenticated
            })?;
        let user_id = claims
            .user_id()
            .map_err(|_| RegistrationError::Unauthenticated)?;

        match self
            .accounts
            .find_user(user_id)
            .await
            .map_err(RegistrationError::Unavailable)?
        {
            Some(user) if user.is_active() => Ok(user),
            _ => Err(RegistrationError::Unauthenticated),
        }
    }

    /// Replace the user's OTT subscriptions with `provider_ids`.
    ///
    /// # Errors
    /// [`RegistrationError::UnknownReference`] if a provider id does not exist.
    #[instrument(skip(self))]
    pub async fn select_ott(
        &self,
        user_id: Uuid,
        provider_ids: &[i32],
    ) -> Result<(), RegistrationError> {
        let provider_ids = dedup_preserving_order(provider_ids);
        match self
            .accounts
            .replace_subscriptions(user_id, &provider_ids)
            .await
            .map_err(RegistrationError::Unavailable)?
        {
            ReplaceOutcome::Replaced => Ok(()),
            ReplaceOutcome::UnknownReference => Err(RegistrationError::UnknownReference),
        }
    }

    /// Replace the user's survey answers with `movie_ids`, stamped now.
    ///
    /// # Errors
    /// [`RegistrationError::EmptySurvey`] for an empty list,
    /// [`RegistrationError::UnknownReference`] if a movie id does not exist.
    #[instrument(skip(self))]
    pub async fn submit_survey(
        &self,
        user_id: Uuid,
        movie_ids: &[i32],
    ) -> Result<(), RegistrationError> {
        if movie_ids.is_empty() {
            return Err(RegistrationError::EmptySurvey);
        }
        let movie_ids = dedup_preserving_order(movie_ids);
        match self
            .accounts
            .replace_answers(user_id, &movie_ids, Utc::now())
            .await
            .map_err(RegistrationError::Unavailable)?
        {
            ReplaceOutcome::Replaced => Ok(()),
            ReplaceOutcome::UnknownReference => Err(RegistrationError::UnknownReference),
        }
    }

    /// Set the onboarding flag. Idempotent.
    ///
    /// # Errors
    /// [`RegistrationError::UserNotFound`] if the user is missing or soft-deleted.
    #[instrument(skip(self))]
    pub async fn complete_onboarding(
        &self,
        user_id: Uuid,
    ) -> Result<OnboardingState, RegistrationError> {
        let user = self
            .accounts
            .mark_onboarding_completed(user_id)
            .await
            .map_err(RegistrationError::Unavailable)?
            .ok_or(RegistrationError::UserNotFound)?;
        Ok(OnboardingState {
            user_id: user.user_id,
            onboarding_completed: user.onboarding_completed,
        })
    }

    /// Report the current onboarding flag without changing it.
    ///
    /// # Errors
    /// [`RegistrationError::UserNotFound`] if the user is missing or soft-deleted.
    #[instrument(skip(self))]
    pub async fn skip_onboarding(
        &self,
        user_id: Uuid,
    ) -> Result<OnboardingState, RegistrationError> {
        let user = self.load_user(user_id).await?;
        Ok(OnboardingState {
            user_id: user.user_id,
            onboarding_completed: user.onboarding_completed,
        })
    }

    /// Current flag plus the stored subscription and survey sets.
    ///
    /// # Errors
    /// [`RegistrationError::UserNotFound`] if the user is missing or soft-deleted.
    pub async fn onboarding_progress(
        &self,
        user_id: Uuid,
    ) -> Result<OnboardingProgress, RegistrationError> {
        let user = self.load_user(user_id).await?;
        let provider_ids = self
            .accounts
            .subscriptions(user_id)
            .await
            .map_err(RegistrationError::Unavailable)?;
        let movie_ids = self
            .accounts
            .answers(user_id)
            .await
            .map_err(RegistrationError::Unavailable)?
            .into_iter()
            .map(|answer| answer.movie_id)
            .collect();
        Ok(OnboardingProgress {
            user_id: user.user_id,
            onboarding_completed: user.onboarding_completed,
            provider_ids,
            movie_ids,
        })
    }

    /// # Errors
    /// `Unavailable` if the account store cannot be read.
    pub async fn list_providers(&self) -> Result<Vec<OttProvider>, RegistrationError> {
        self.accounts
            .providers()
            .await
            .map_err(RegistrationError::Unavailable)
    }

    /// # Errors
    /// `Unavailable` if the account store cannot be read.
    pub async fn list_candidates(&self) -> Result<Vec<OnboardingCandidate>, RegistrationError> {
        self.accounts
            .candidates()
            .await
            .map_err(RegistrationError::Unavailable)
    }

    pub async fn health(&self) -> StoreHealth {
        let (accounts, pending) = tokio::join!(self.accounts.ping(), self.pending.ping());
        if let Err(err) = &accounts {
            warn!("Account store health check failed: {err:#}");
        }
        if let Err(err) = &pending {
            warn!("Pending signup store health check failed: {err:#}");
        }
        StoreHealth {
            accounts: accounts.is_ok(),
            pending: pending.is_ok(),
        }
    }

    async fn load_pending(&self, email: &str) -> Result<PendingSignup, RegistrationError> {
        self.pending
            .get(email)
            .await
            .map_err(RegistrationError::Unavailable)?
            .ok_or(RegistrationError::NoPendingSignup)
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, RegistrationError> {
        self.accounts
            .find_user(user_id)
            .await
            .map_err(RegistrationError::Unavailable)?
            .filter(User::is_active)
            .ok_or(RegistrationError::UserNotFound)
    }
}

async fn rollback(staged: Box<dyn StagedUser>) {
    if let Err(err) = staged.rollback().await {
        warn!("Failed to roll back staged user: {err:#}");
    }
}

/// Argon2 is CPU bound; keep it off the async workers.
async fn hash_in_background(password: String) -> Result<String, RegistrationError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|err| RegistrationError::Internal(anyhow!(err)))?
        .map_err(RegistrationError::Internal)
}

fn dedup_preserving_order(ids: &[i32]) -> Vec<i32> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
