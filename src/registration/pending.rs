//! Pending-signup storage.
//!
//! A pending signup is the only state that exists for an email before the
//! account does. Records are keyed by email, overwritten on re-request and
//! expire on their own; nothing here sweeps actively.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{Instrument, info_span};

const KEY_PREFIX: &str = "signup:";

/// Data staged between signup request and confirmation.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingSignup {
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub code: String,
}

impl std::fmt::Debug for PendingSignup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSignup")
            .field("email", &self.email)
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait PendingSignupStore: Send + Sync {
    /// Write or overwrite the record for `signup.email`, expiring after `ttl`.
    async fn put(&self, signup: &PendingSignup, ttl: Duration) -> Result<()>;

    /// Fetch a live record. Expired and missing records both yield `None`.
    async fn get(&self, email: &str) -> Result<Option<PendingSignup>>;

    async fn delete(&self, email: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

fn signup_key(email: &str) -> String {
    format!("{KEY_PREFIX}{email}")
}

/// Redis-backed store: one hash per email at `signup:{email}` with `EXPIRE`.
#[derive(Clone)]
pub struct RedisPendingStore {
    conn: ConnectionManager,
}

impl RedisPendingStore {
    /// Connect to Redis; the connection manager reconnects on its own afterwards.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

fn kv_span(operation: &'static str) -> tracing::Span {
    info_span!("kv.command", db.system = "redis", db.operation = operation)
}

#[async_trait]
impl PendingSignupStore for RedisPendingStore {
    async fn put(&self, signup: &PendingSignup, ttl: Duration) -> Result<()> {
        let key = signup_key(&signup.email);
        let fields = [
            ("email", signup.email.as_str()),
            ("password", signup.password_hash.as_str()),
            ("nickname", signup.nickname.as_str()),
            ("code", signup.code.as_str()),
        ];
        let ttl_seconds = i64::try_from(ttl.as_secs()).context("signup ttl out of range")?;

        // DEL first so a re-request never leaves fields from an older record.
        let mut conn = self.conn.clone();
        let (): () = redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, ttl_seconds)
            .ignore()
            .query_async(&mut conn)
            .instrument(kv_span("MULTI"))
            .await
            .context("failed to store pending signup")?;
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<PendingSignup>> {
        let mut conn = self.conn.clone();
        let mut fields: HashMap<String, String> = conn
            .hgetall(signup_key(email))
            .instrument(kv_span("HGETALL"))
            .await
            .context("failed to read pending signup")?;

        if fields.is_empty() {
            return Ok(None);
        }

        let mut take = |name: &str| {
            fields
                .remove(name)
                .with_context(|| format!("pending signup is missing field {name}"))
        };
        Ok(Some(PendingSignup {
            email: take("email")?,
            password_hash: take("password")?,
            nickname: take("nickname")?,
            code: take("code")?,
        }))
    }

    async fn delete(&self, email: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let (): () = conn
            .del(signup_key(email))
            .instrument(kv_span("DEL"))
            .await
            .context("failed to delete pending signup")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .instrument(kv_span("PING"))
            .await
            .context("failed to ping Redis")?;
        Ok(())
    }
}

struct MemoryEntry {
    signup: PendingSignup,
    expires_at: Instant,
}

/// In-process store used when no Redis URL is configured.
///
/// Expiry is checked on read; stale entries are pruned on every write.
#[derive(Default)]
pub struct MemoryPendingStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryPendingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingSignupStore for MemoryPendingStore {
    async fn put(&self, signup: &PendingSignup, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .context("signup ttl out of range")?;
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            signup.email.clone(),
            MemoryEntry {
                signup: signup.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<PendingSignup>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(email)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.signup.clone()))
    }

    async fn delete(&self, email: &str) -> Result<()> {
        self.entries.lock().await.remove(email);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
