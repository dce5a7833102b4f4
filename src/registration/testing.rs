//! In-process doubles for exercising the workflow and the router without
//! Postgres, Redis or SMTP.

#![allow(clippy::unwrap_used)]

use super::{
    AccountStore, InsertOutcome, MemoryPendingStore, OnboardingCandidate, OttProvider,
    PendingSignup, PendingSignupStore, Registration, ReplaceOutcome, StagedUser, SurveyAnswer,
    TokenIssuer, User, code::CodeGenerator,
};
use crate::mail::{Mailer, SignupCodeMessage};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::Barrier;
use uuid::Uuid;

pub const TEST_TOKEN_SECRET: &str = "marquee-test-signing-secret-0123456789";

pub fn token_issuer() -> Arc<TokenIssuer> {
    Arc::new(TokenIssuer::new(SecretString::from(TEST_TOKEN_SECRET.to_string()), 3600).unwrap())
}

#[derive(Default)]
struct Accounts {
    users: HashMap<Uuid, (User, String)>,
    reserved: HashSet<String>,
    subscriptions: HashMap<Uuid, Vec<i32>>,
    answers: HashMap<Uuid, Vec<SurveyAnswer>>,
    providers: Vec<OttProvider>,
    movies: HashMap<i32, String>,
    candidates: Vec<OnboardingCandidate>,
}

/// Account store with the same observable rules as the Postgres schema:
/// unique emails (held from insert until commit or rollback) and
/// foreign keys on subscription and answer ids.
pub struct MemoryAccountStore {
    inner: Arc<Mutex<Accounts>>,
    fail_commit: Arc<AtomicBool>,
    offline: AtomicBool,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    /// Seeded with providers 1..=5 and movies 10, 20, 30, 40.
    pub fn new() -> Self {
        let mut accounts = Accounts::default();
        for (provider_id, name) in [
            (1, "Netflix"),
            (2, "Tving"),
            (3, "Wavve"),
            (4, "Disney+"),
            (5, "Watcha"),
        ] {
            accounts.providers.push(OttProvider {
                provider_id,
                provider_name: name.to_string(),
                logo_path: Some(format!("/logos/{provider_id}.png")),
            });
        }
        for (index, (movie_id, title, mood)) in [
            (10, "Heat", "tense"),
            (20, "Amelie", "warm"),
            (30, "Alien", "tense"),
            (40, "Paddington 2", "warm"),
        ]
        .into_iter()
        .enumerate()
        {
            let order = i32::try_from(index).unwrap();
            accounts.movies.insert(movie_id, title.to_string());
            accounts.candidates.push(OnboardingCandidate {
                id: order + 1,
                movie_id,
                title: title.to_string(),
                mood_tag: mood.to_string(),
                display_order: order,
            });
        }
        Self {
            inner: Arc::new(Mutex::new(accounts)),
            fail_commit: Arc::new(AtomicBool::new(false)),
            offline: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Accounts> {
        self.inner.lock().unwrap()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("account store offline");
        }
        Ok(())
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Insert a committed user directly, bypassing signup.
    pub fn seed_user(&self, email: &str) -> Uuid {
        let user = User {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            onboarding_completed: false,
            deleted_at: None,
        };
        let user_id = user.user_id;
        self.lock()
            .users
            .insert(user_id, (user, "$argon2id$seeded".to_string()));
        user_id
    }

    pub fn soft_delete(&self, user_id: Uuid) {
        if let Some((user, _)) = self.lock().users.get_mut(&user_id) {
            user.deleted_at = Some(Utc::now());
        }
    }

    pub fn users_with_email(&self, email: &str) -> Vec<User> {
        self.lock()
            .users
            .values()
            .filter(|(user, _)| user.email == email)
            .map(|(user, _)| user.clone())
            .collect()
    }

    pub fn password_hash_of(&self, user_id: Uuid) -> Option<String> {
        self.lock().users.get(&user_id).map(|(_, hash)| hash.clone())
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn subscription_set(&self, user_id: Uuid) -> HashSet<i32> {
        self.lock()
            .subscriptions
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn answer_rows(&self, user_id: Uuid) -> Vec<SurveyAnswer> {
        self.lock().answers.get(&user_id).cloned().unwrap_or_default()
    }
}

struct MemoryStagedUser {
    inner: Arc<Mutex<Accounts>>,
    fail_commit: Arc<AtomicBool>,
    user: User,
    password_hash: String,
    finished: bool,
}

impl MemoryStagedUser {
    fn release(&mut self) {
        self.finished = true;
        self.inner.lock().unwrap().reserved.remove(&self.user.email);
    }
}

impl Drop for MemoryStagedUser {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

#[async_trait]
impl StagedUser for MemoryStagedUser {
    fn user(&self) -> &User {
        &self.user
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut staged = self;
        if staged.fail_commit.load(Ordering::SeqCst) {
            staged.release();
            bail!("commit failed");
        }
        staged.finished = true;
        let mut accounts = staged.inner.lock().unwrap();
        accounts.reserved.remove(&staged.user.email);
        accounts.users.insert(
            staged.user.user_id,
            (staged.user.clone(), staged.password_hash.clone()),
        );
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut staged = self;
        staged.release();
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.lock().users.values().any(|(user, _)| user.email == email))
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<InsertOutcome> {
        self.check_online()?;
        let mut accounts = self.lock();
        let taken = accounts.reserved.contains(email)
            || accounts.users.values().any(|(user, _)| user.email == email);
        if taken {
            return Ok(InsertOutcome::Conflict);
        }
        accounts.reserved.insert(email.to_string());
        drop(accounts);

        Ok(InsertOutcome::Staged(Box::new(MemoryStagedUser {
            inner: Arc::clone(&self.inner),
            fail_commit: Arc::clone(&self.fail_commit),
            user: User {
                user_id: Uuid::new_v4(),
                email: email.to_string(),
                onboarding_completed: false,
                deleted_at: None,
            },
            password_hash: password_hash.to_string(),
            finished: false,
        })))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        self.check_online()?;
        Ok(self.lock().users.get(&user_id).map(|(user, _)| user.clone()))
    }

    async fn replace_subscriptions(
        &self,
        user_id: Uuid,
        provider_ids: &[i32],
    ) -> Result<ReplaceOutcome> {
        self.check_online()?;
        let mut accounts = self.lock();
        let known = accounts.users.contains_key(&user_id)
            && provider_ids
                .iter()
                .all(|id| accounts.providers.iter().any(|p| p.provider_id == *id));
        if !known {
            return Ok(ReplaceOutcome::UnknownReference);
        }
        accounts.subscriptions.insert(user_id, provider_ids.to_vec());
        Ok(ReplaceOutcome::Replaced)
    }

    async fn replace_answers(
        &self,
        user_id: Uuid,
        movie_ids: &[i32],
        selected_at: DateTime<Utc>,
    ) -> Result<ReplaceOutcome> {
        self.check_online()?;
        let mut accounts = self.lock();
        let known = accounts.users.contains_key(&user_id)
            && movie_ids.iter().all(|id| accounts.movies.contains_key(id));
        if !known {
            return Ok(ReplaceOutcome::UnknownReference);
        }
        let rows = movie_ids
            .iter()
            .map(|movie_id| SurveyAnswer {
                movie_id: *movie_id,
                selected_at,
            })
            .collect();
        accounts.answers.insert(user_id, rows);
        Ok(ReplaceOutcome::Replaced)
    }

    async fn mark_onboarding_completed(&self, user_id: Uuid) -> Result<Option<User>> {
        self.check_online()?;
        let mut accounts = self.lock();
        Ok(accounts
            .users
            .get_mut(&user_id)
            .filter(|(user, _)| user.is_active())
            .map(|(user, _)| {
                user.onboarding_completed = true;
                user.clone()
            }))
    }

    async fn subscriptions(&self, user_id: Uuid) -> Result<Vec<i32>> {
        self.check_online()?;
        let mut ids = self
            .lock()
            .subscriptions
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn answers(&self, user_id: Uuid) -> Result<Vec<SurveyAnswer>> {
        self.check_online()?;
        let mut rows = self.answer_rows(user_id);
        rows.sort_by_key(|row| row.movie_id);
        Ok(rows)
    }

    async fn providers(&self) -> Result<Vec<OttProvider>> {
        self.check_online()?;
        Ok(self.lock().providers.clone())
    }

    async fn candidates(&self) -> Result<Vec<OnboardingCandidate>> {
        self.check_online()?;
        Ok(self.lock().candidates.clone())
    }

    async fn ping(&self) -> Result<()> {
        self.check_online()
    }
}

/// Wraps the in-process store with switchable failures.
#[derive(Default)]
pub struct FlakyPendingStore {
    inner: MemoryPendingStore,
    pub fail_get: AtomicBool,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingSignupStore for FlakyPendingStore {
    async fn put(&self, signup: &PendingSignup, ttl: Duration) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            bail!("pending store offline");
        }
        self.inner.put(signup, ttl).await
    }

    async fn get(&self, email: &str) -> Result<Option<PendingSignup>> {
        if self.fail_get.load(Ordering::SeqCst) {
            bail!("pending store offline");
        }
        self.inner.get(email).await
    }

    async fn delete(&self, email: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            bail!("pending store offline");
        }
        self.inner.delete(email).await
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_get.load(Ordering::SeqCst) {
            bail!("pending store offline");
        }
        Ok(())
    }
}

/// Holds every reader at `get` until `parties` readers have arrived, so
/// concurrent confirmations all see the pending record before any deletes it.
pub struct RendezvousPendingStore {
    inner: MemoryPendingStore,
    barrier: Barrier,
}

impl RendezvousPendingStore {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: MemoryPendingStore::new(),
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl PendingSignupStore for RendezvousPendingStore {
    async fn put(&self, signup: &PendingSignup, ttl: Duration) -> Result<()> {
        self.inner.put(signup, ttl).await
    }

    async fn get(&self, email: &str) -> Result<Option<PendingSignup>> {
        let found = self.inner.get(email).await;
        self.barrier.wait().await;
        found
    }

    async fn delete(&self, email: &str) -> Result<()> {
        self.inner.delete(email).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SignupCodeMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SignupCodeMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|message| message.to_email == email)
            .map(|message| message.code.clone())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_signup_code(&self, message: &SignupCodeMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_signup_code(&self, _message: &SignupCodeMessage) -> Result<()> {
        Err(anyhow!("smtp relay refused connection"))
    }
}

/// Hands out queued codes in order, then `000000`.
#[derive(Default)]
pub struct FixedCodes {
    queue: Mutex<VecDeque<String>>,
}

impl FixedCodes {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            queue: Mutex::new(codes.iter().map(ToString::to_string).collect()),
        }
    }
}

impl CodeGenerator for FixedCodes {
    fn generate(&self) -> String {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "000000".to_string())
    }
}

/// A workflow wired to in-process doubles, with handles to each of them.
pub struct Harness {
    pub registration: Arc<Registration>,
    pub accounts: Arc<MemoryAccountStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_pending(Arc::new(MemoryPendingStore::new()))
    }

    pub fn with_pending(pending: Arc<dyn PendingSignupStore>) -> Self {
        let accounts = Arc::new(MemoryAccountStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let registration = Registration::new(
            pending,
            Arc::clone(&accounts) as Arc<dyn AccountStore>,
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            token_issuer(),
        );
        Self {
            registration: Arc::new(registration),
            accounts,
            mailer,
        }
    }

    /// Run the whole signup for `email` and return the new user id and token.
    pub async fn signed_up(&self, email: &str) -> (Uuid, String) {
        self.registration
            .request_signup(email, "password1", "Ann")
            .await
            .unwrap();
        let code = self.mailer.last_code_for(email).unwrap();
        let confirmed = self.registration.confirm_signup(email, &code).await.unwrap();
        (confirmed.user_id, confirmed.access_token)
    }
}
