use crate::{
    api::{self, Collaborators},
    mail::{LogMailer, Mailer, SmtpConfig, SmtpMailer},
    registration::{MemoryPendingStore, PendingSignupStore, RedisPendingStore, TokenIssuer},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: Option<String>,
    pub frontend_base_url: Option<String>,
    pub token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub signup_ttl_seconds: u64,
    pub smtp: Option<SmtpConfig>,
}

fn mailer(smtp: Option<&SmtpConfig>) -> Result<Arc<dyn Mailer>> {
    match smtp {
        Some(config) => Ok(Arc::new(SmtpMailer::new(config)?)),
        None => {
            warn!("SMTP host not configured, signup codes will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

async fn pending_store(redis_url: Option<&str>) -> Result<Arc<dyn PendingSignupStore>> {
    match redis_url {
        Some(url) => Ok(Arc::new(RedisPendingStore::connect(url).await?)),
        None => {
            warn!("Redis URL not configured, pending signups are kept in process memory");
            Ok(Arc::new(MemoryPendingStore::new()))
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the token secret is too weak, a collaborator cannot be
/// built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let tokens = TokenIssuer::new(args.token_secret, args.token_ttl_seconds)
        .context("Invalid access token configuration")?;

    let collaborators = Collaborators {
        pending: pending_store(args.redis_url.as_deref()).await?,
        mailer: mailer(args.smtp.as_ref())?,
        tokens: Arc::new(tokens),
        signup_ttl: Duration::from_secs(args.signup_ttl_seconds),
    };

    api::new(
        args.port,
        args.dsn,
        args.frontend_base_url,
        collaborators,
    )
    .await
}
