//! # Marquee (signup and onboarding API)
//!
//! `marquee` is the account entry point of a movie-recommendation product. It
//! owns email/password signup with email-code verification and the onboarding
//! flow that follows it.
//!
//! ## Signup
//!
//! A signup request never creates an account. It stages a *pending signup*
//! (hashed password, nickname, 6-digit code) in an ephemeral key-value store
//! keyed by email, with a fixed 10 minute lifetime, and mails the code.
//!
//! - **Re-requests** for the same email overwrite the pending record, so only
//!   the newest code confirms.
//! - **Confirmation** is the only path that creates a user. The user insert
//!   is staged in a database transaction and committed only after the pending
//!   record is gone; the unique index on `users.email` is the final guard
//!   against two confirmations racing for the same address.
//! - Missing and expired pending signups are indistinguishable to callers.
//!
//! ## Onboarding
//!
//! Authenticated with the bearer token issued at confirmation. OTT selection
//! and the poster survey are full replacements (delete-then-insert in one
//! transaction), so re-submitting the same payload is a no-op in effect.
//! Completing onboarding is idempotent; skipping it reports the current flag
//! without changing it.

pub mod api;
pub mod cli;
pub mod mail;
pub mod registration;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
