//! Verification-code delivery.
//!
//! `SmtpMailer` relays through an SMTP server with STARTTLS. Without an SMTP
//! host the service falls back to `LogMailer`, which writes the code to the
//! log so local signups can still be confirmed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{Instrument, info, info_span};

pub const SIGNUP_CODE_SUBJECT: &str = "Your Marquee verification code";

#[derive(Clone, Debug)]
pub struct SignupCodeMessage {
    pub to_email: String,
    pub nickname: String,
    pub code: String,
    pub expires_in_seconds: u64,
}

impl SignupCodeMessage {
    #[must_use]
    pub fn body(&self) -> String {
        let minutes = self.expires_in_seconds.div_ceil(60);
        format!(
            "Hi {},\n\nYour verification code is {}.\nIt expires in {} minute{}.\n\nIf you did not sign up for Marquee, ignore this email.\n",
            self.nickname,
            self.code,
            minutes,
            if minutes == 1 { "" } else { "s" }
        )
    }
}

/// Delivery of signup verification codes.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver the message or return an error; callers decide whether it is fatal.
    async fn send_signup_code(&self, message: &SignupCodeMessage) -> Result<()>;
}

/// Local dev mailer that logs the code instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_signup_code(&self, message: &SignupCodeMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            code = %message.code,
            expires_in = message.expires_in_seconds,
            "signup code (smtp not configured)"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a pooled STARTTLS transport. No connection is opened here.
    ///
    /// # Errors
    /// Returns an error if the relay host or sender address is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("Invalid sender address: {}", config.from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("Failed to create SMTP transport for {}", config.host))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, message: &SignupCodeMessage) -> Result<Message> {
        let to: Mailbox = message
            .to_email
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", message.to_email))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(SIGNUP_CODE_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body())
            .context("Failed to build email")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_signup_code(&self, message: &SignupCodeMessage) -> Result<()> {
        let email = self.build_message(message)?;
        let span = info_span!("smtp.send", to_email = %message.to_email);
        self.transport
            .send(email)
            .instrument(span)
            .await
            .context("Failed to send signup code")?;
        Ok(())
    }
}
