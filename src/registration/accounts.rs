//! Durable account storage: users, OTT subscriptions, survey answers and the
//! read-only catalog the onboarding screens draw from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Connection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::{Instrument, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub onboarding_completed: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OttProvider {
    pub provider_id: i32,
    pub provider_name: String,
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OnboardingCandidate {
    pub id: i32,
    pub movie_id: i32,
    pub title: String,
    pub mood_tag: String,
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyAnswer {
    pub movie_id: i32,
    pub selected_at: DateTime<Utc>,
}

/// A user insert that has been written but not yet committed.
///
/// Dropping it without calling either method rolls the insert back.
#[async_trait]
pub trait StagedUser: Send {
    fn user(&self) -> &User;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub enum InsertOutcome {
    Staged(Box<dyn StagedUser>),
    /// The unique email index rejected the row.
    Conflict,
}

impl std::fmt::Debug for InsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staged(staged) => f.debug_tuple("Staged").field(staged.user()).finish(),
            Self::Conflict => f.write_str("Conflict"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// A submitted id does not exist in the catalog; nothing was changed.
    UnknownReference,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Stage a new user with an already-hashed password.
    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<InsertOutcome>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Replace the user's subscription set in one transaction.
    async fn replace_subscriptions(
        &self,
        user_id: Uuid,
        provider_ids: &[i32],
    ) -> Result<ReplaceOutcome>;

    /// Replace the user's survey answers in one transaction.
    async fn replace_answers(
        &self,
        user_id: Uuid,
        movie_ids: &[i32],
        selected_at: DateTime<Utc>,
    ) -> Result<ReplaceOutcome>;

    /// Set the onboarding flag; `None` if the user is missing or soft-deleted.
    async fn mark_onboarding_completed(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn subscriptions(&self, user_id: Uuid) -> Result<Vec<i32>>;

    async fn answers(&self, user_id: Uuid) -> Result<Vec<SurveyAnswer>>;

    async fn providers(&self) -> Result<Vec<OttProvider>>;

    async fn candidates(&self) -> Result<Vec<OnboardingCandidate>>;

    async fn ping(&self) -> Result<()>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23503")
}

fn has_sqlstate(err: &sqlx::Error, state: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == state),
        _ => false,
    }
}

const USER_COLUMNS: &str = "user_id, email, onboarding_completed, deleted_at";

fn user_from_row(row: &PgRow) -> User {
    User {
        user_id: row.get("user_id"),
        email: row.get("email"),
        onboarding_completed: row.get("onboarding_completed"),
        deleted_at: row.get("deleted_at"),
    }
}

/// Postgres-backed account store.
#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgStagedUser {
    tx: Transaction<'static, Postgres>,
    user: User,
}

#[async_trait]
impl StagedUser for PgStagedUser {
    fn user(&self) -> &User {
        &self.user
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("commit user insert")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.context("rollback user insert")
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let query = "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS exists";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check if email exists")?;
        Ok(row.get("exists"))
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await.context("begin signup transaction")?;

        let query = format!(
            "INSERT INTO users (user_id, email, password) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(password_hash)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(InsertOutcome::Staged(Box::new(PgStagedUser {
                user: user_from_row(&row),
                tx,
            }))),
            Err(err) => {
                let _ = tx.rollback().await;
                if is_unique_violation(&err) {
                    return Ok(InsertOutcome::Conflict);
                }
                Err(err).context("failed to insert user")
            }
        }
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn replace_subscriptions(
        &self,
        user_id: Uuid,
        provider_ids: &[i32],
    ) -> Result<ReplaceOutcome> {
        let mut tx = self.pool.begin().await.context("begin ott transaction")?;

        let query = "DELETE FROM user_ott_map WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear subscriptions")?;

        if !provider_ids.is_empty() {
            let query = r"
                INSERT INTO user_ott_map (user_id, provider_id)
                SELECT $1, provider_id FROM UNNEST($2::int4[]) AS ids(provider_id)
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let inserted = sqlx::query(query)
                .bind(user_id)
                .bind(provider_ids)
                .execute(&mut *tx)
                .instrument(span)
                .await;
            if let Err(err) = inserted {
                let _ = tx.rollback().await;
                if is_foreign_key_violation(&err) {
                    return Ok(ReplaceOutcome::UnknownReference);
                }
                return Err(err).context("failed to insert subscriptions");
            }
        }

        tx.commit().await.context("commit ott transaction")?;
        Ok(ReplaceOutcome::Replaced)
    }

    async fn replace_answers(
        &self,
        user_id: Uuid,
        movie_ids: &[i32],
        selected_at: DateTime<Utc>,
    ) -> Result<ReplaceOutcome> {
        let mut tx = self.pool.begin().await.context("begin survey transaction")?;

        let query = "DELETE FROM user_onboarding_answers WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear survey answers")?;

        if !movie_ids.is_empty() {
            let query = r"
                INSERT INTO user_onboarding_answers (user_id, movie_id, selected_at)
                SELECT $1, movie_id, $3 FROM UNNEST($2::int4[]) AS ids(movie_id)
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let inserted = sqlx::query(query)
                .bind(user_id)
                .bind(movie_ids)
                .bind(selected_at)
                .execute(&mut *tx)
                .instrument(span)
                .await;
            if let Err(err) = inserted {
                let _ = tx.rollback().await;
                if is_foreign_key_violation(&err) {
                    return Ok(ReplaceOutcome::UnknownReference);
                }
                return Err(err).context("failed to insert survey answers");
            }
        }

        tx.commit().await.context("commit survey transaction")?;
        Ok(ReplaceOutcome::Replaced)
    }

    async fn mark_onboarding_completed(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET onboarding_completed = TRUE WHERE user_id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to complete onboarding")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn subscriptions(&self, user_id: Uuid) -> Result<Vec<i32>> {
        let query = "SELECT provider_id FROM user_ott_map WHERE user_id = $1 ORDER BY provider_id";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list subscriptions")?;
        Ok(rows.iter().map(|row| row.get("provider_id")).collect())
    }

    async fn answers(&self, user_id: Uuid) -> Result<Vec<SurveyAnswer>> {
        let query = r"
            SELECT movie_id, selected_at
            FROM user_onboarding_answers
            WHERE user_id = $1
            ORDER BY movie_id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list survey answers")?;
        Ok(rows
            .iter()
            .map(|row| SurveyAnswer {
                movie_id: row.get("movie_id"),
                selected_at: row.get("selected_at"),
            })
            .collect())
    }

    async fn providers(&self) -> Result<Vec<OttProvider>> {
        let query =
            "SELECT provider_id, provider_name, logo_path FROM ott_providers ORDER BY provider_id";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list providers")?;
        Ok(rows
            .iter()
            .map(|row| OttProvider {
                provider_id: row.get("provider_id"),
                provider_name: row.get("provider_name"),
                logo_path: row.get("logo_path"),
            })
            .collect())
    }

    async fn candidates(&self) -> Result<Vec<OnboardingCandidate>> {
        let query = r"
            SELECT c.id, c.movie_id, m.title, c.mood_tag, c.display_order
            FROM onboarding_candidates c
            JOIN movies m ON m.movie_id = c.movie_id
            ORDER BY c.display_order, c.id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list onboarding candidates")?;
        Ok(rows
            .iter()
            .map(|row| OnboardingCandidate {
                id: row.get("id"),
                movie_id: row.get("movie_id"),
                title: row.get("title"),
                mood_tag: row.get("mood_tag"),
                display_order: row.get("display_order"),
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
