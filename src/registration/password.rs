//! Argon2id password hashing.
//!
//! Hashes are PHC strings, so parameters and salt travel with the hash.

use anyhow::Result;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use rand::rngs::OsRng;

/// Hash a plaintext password with Argon2id and a random salt.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Check a plaintext password against a stored PHC hash.
#[cfg(test)]
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    use argon2::{PasswordHash, PasswordVerifier};

    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow::anyhow!("invalid password hash"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
