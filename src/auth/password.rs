#![forbid(unsafe_code)]

//! Password hashing and policy. The teacher hashes high-entropy API
//! secrets with a bare `sha2` digest (`hash_hex_secret` in the old
//! `authz.rs`) because those secrets never need to resist offline
//! guessing; user passwords do, so this module reaches for `argon2`
//! instead and keeps the teacher's hash-then-compare call shape.

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, Params, Version};

use crate::utils::api_error::ApiError;
use crate::utils::config::AuthConfig;

/// Hash `password` with Argon2id at the configured cost factor.
pub fn hash_password(password: &str, cfg: &AuthConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params::new(19 * 1024, cfg.argon2_cost_factor, 1, None)
        .map_err(|e| anyhow!("invalid argon2 params: {e}"))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Constant-time verification against a stored hash string.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| anyhow!("corrupt password hash: {e}"))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Policy (§4.1): >= 8 chars, upper, lower, digit, special, and must not
/// contain the username (case-insensitive) once the username is long
/// enough to be a meaningful substring check.
pub fn check_password_policy(password: &str, username: &str) -> Result<(), ApiError> {
    if password.chars().count() < 8 {
        return Err(ApiError::Validation("password must be at least 8 characters".into()));
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(ApiError::Validation(
            "password must contain upper, lower, digit and special characters".into(),
        ));
    }
    if username.chars().count() >= 3 && password.to_lowercase().contains(&username.to_lowercase()) {
        return Err(ApiError::Validation("password must not contain the username".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AuthConfig {
        crate::utils::config::Config::default().auth
    }

    #[test]
    fn hash_then_verify_round_trips() {
        let cfg = cfg();
        let hash = hash_password("Sup3r$ecret", &cfg).unwrap();
        assert!(verify_password("Sup3r$ecret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn policy_rejects_weak_passwords() {
        assert!(check_password_policy("short1!", "alice").is_err());
        assert!(check_password_policy("alllowercase1!", "alice").is_err());
        assert!(check_password_policy("aliceIsTheUser1!", "alice").is_err());
        assert!(check_password_policy("Correct1!Horse", "alice").is_ok());
    }
}
