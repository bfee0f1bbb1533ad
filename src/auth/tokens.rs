#![forbid(unsafe_code)]

//! Access and refresh token issuance. Access tokens are signed JWTs
//! (`jsonwebtoken`, HS256); refresh tokens are opaque high-entropy
//! strings whose SHA-256 hash is what's persisted, the same
//! hash-the-secret-before-storing shape the teacher used for client
//! secrets in its old authz layer.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    /// Password-change version counter; a token minted before the most
    /// recent password change is rejected even if not yet expired.
    pub ver: i64,
}

pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_access_token(user_id: Uuid, ver: i64, ttl_minutes: i64, signing_key: &[u8]) -> Result<AccessToken> {
    let now = Utc::now();
    let expires_at = now.checked_add_signed(Duration::minutes(ttl_minutes)).unwrap_or(DateTime::<Utc>::MAX_UTC);
    let claims = AccessClaims { sub: user_id, iat: now.timestamp(), exp: expires_at.timestamp(), ver };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(signing_key))
        .map_err(|e| anyhow!("failed to sign access token: {e}"))?;
    Ok(AccessToken { token, expires_at })
}

/// Returns `Ok(claims)` only if the token is well-formed and unexpired;
/// the caller is responsible for checking `ver` against the user's
/// current password-change counter.
pub fn verify_access_token(token: &str, signing_key: &[u8]) -> Result<AccessClaims> {
    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(signing_key), &Validation::default())
        .map_err(|e| anyhow!("invalid access token: {e}"))?;
    Ok(data.claims)
}

pub struct RefreshToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a new opaque refresh token and its at-rest hash.
pub fn issue_refresh_token(ttl_days: i64) -> RefreshToken {
    let plaintext = Alphanumeric.sample_string(&mut rand::thread_rng(), 48);
    let expires_at =
        Utc::now().checked_add_signed(Duration::days(ttl_days)).unwrap_or(DateTime::<Utc>::MAX_UTC);
    RefreshToken { hash: hash_refresh_token(&plaintext), plaintext, expires_at }
}

pub fn hash_refresh_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips() {
        let key = b"test-signing-key";
        let id = Uuid::new_v4();
        let issued = issue_access_token(id, 0, 30, key).unwrap();
        let claims = verify_access_token(&issued.token, key).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.ver, 0);
    }

    #[test]
    fn refresh_token_hash_is_deterministic() {
        let rt = issue_refresh_token(7);
        assert_eq!(hash_refresh_token(&rt.plaintext), rt.hash);
    }
}
