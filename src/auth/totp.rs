#![forbid(unsafe_code)]

//! TOTP (RFC 6238) and backup codes. Implemented locally against
//! `hmac`/`sha2`/`base32` rather than a dedicated TOTP crate, since that's
//! the primitive-level stack already in the dependency tree.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use rand::distributions::{Alphanumeric, DistString};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::utils::config::AuthConfig;

type HmacSha1 = Hmac<Sha1>;

const SECRET_BYTES: usize = 20;

/// Generate a new random base32-encoded TOTP secret.
pub fn generate_secret() -> String {
    let mut buf = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &buf)
}

fn hotp(secret: &[u8], counter: u64) -> Result<u32> {
    let mut mac = HmacSha1::new_from_slice(secret).map_err(|e| anyhow!("bad totp secret: {e}"))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let code = ((u32::from(digest[offset]) & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);
    Ok(code % 1_000_000)
}

/// Verify a 6-digit `code` against `secret` at time `now_unix`, allowing
/// `cfg.totp_drift_steps` steps of clock drift on either side.
pub fn verify_code(secret_b32: &str, code: &str, now_unix: u64, cfg: &AuthConfig) -> Result<bool> {
    let secret = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, secret_b32)
        .ok_or_else(|| anyhow!("invalid base32 totp secret"))?;
    let Ok(submitted): Result<u32, _> = code.parse() else { return Ok(false) };
    let counter = now_unix / cfg.totp_step_seconds;
    let drift = cfg.totp_drift_steps as i64;
    for delta in -drift..=drift {
        let c = (counter as i64 + delta).max(0) as u64;
        if hotp(&secret, c)? == submitted {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Generate `count` single-use backup codes (plaintext, returned once) and
/// their SHA-256 hex digests (what gets persisted). The teacher's
/// `hash_hex_secret` pattern -- hash a high-entropy secret with a fast
/// digest, because the secret itself has enough entropy that slow KDFs add
/// nothing -- fits here the same way it fits refresh tokens.
pub fn generate_backup_codes(count: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|_| {
            let code = Alphanumeric.sample_string(&mut rand::thread_rng(), 10).to_uppercase();
            let hash = hash_backup_code(&code);
            (code, hash)
        })
        .collect()
}

pub fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotp_matches_rfc6238_test_vector() {
        // RFC 6238 appendix B test vector, SHA-1, seed "12345678901234567890".
        let secret = b"12345678901234567890";
        assert_eq!(hotp(secret, 59 / 30).unwrap(), 287_082);
    }

    #[test]
    fn verify_code_allows_configured_drift() {
        let cfg = crate::utils::config::Config::default().auth;
        let secret = generate_secret();
        let raw = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &secret).unwrap();
        let now = 1_700_000_000u64;
        let counter = now / cfg.totp_step_seconds;
        let code = format!("{:06}", hotp(&raw, counter).unwrap());
        assert!(verify_code(&secret, &code, now, &cfg).unwrap());
        assert!(!verify_code(&secret, "000000", now, &cfg).unwrap() || code == "000000");
    }
}
