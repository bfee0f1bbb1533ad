#![forbid(unsafe_code)]

//! Registration, login, refresh, logout and MFA enrollment — the
//! operations `v1/auth.rs` and `v1/mfa.rs` call into. Kept as free
//! functions taking `&impl Store`, the same shape the reservation and
//! waitlist services use, so they're testable against the in-memory fake.

use anyhow::Result;
use chrono::Utc;

use crate::auth::password::{check_password_policy, hash_password, verify_password};
use crate::auth::tokens::{issue_access_token, issue_refresh_token, verify_access_token};
use crate::auth::totp::{generate_backup_codes, generate_secret, verify_code};
use crate::utils::api_error::ApiError;
use crate::utils::config::Config;
use crate::utils::db::{RotateOutcome, Store};
use crate::utils::db_types::{RefreshTokenInput, User, UserInput};

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn register(store: &impl Store, cfg: &Config, username: &str, password: &str) -> Result<User, ApiError> {
    check_password_policy(password, username)?;
    if store.get_user_by_username(username).await.map_err(ApiError::Internal)?.is_some() {
        return Err(ApiError::Conflict("username already registered".into(), vec![]));
    }
    let hash = hash_password(password, &cfg.auth).map_err(ApiError::Internal)?;
    let user = store.insert_user(UserInput::new(username.to_string(), hash)).await.map_err(ApiError::Internal)?;
    store.assign_role(user.id, "user").await.map_err(ApiError::Internal)?;
    Ok(user)
}

async fn issue_pair(store: &impl Store, cfg: &Config, user: &User) -> Result<TokenPair, ApiError> {
    let access = issue_access_token(user.id, 0, cfg.auth.access_token_minutes, signing_key(cfg))
        .map_err(ApiError::Internal)?;
    let refresh = issue_refresh_token(cfg.auth.refresh_token_days);
    store
        .insert_refresh_token(RefreshTokenInput::new(uuid::Uuid::new_v4(), user.id, refresh.hash, refresh.expires_at))
        .await
        .map_err(ApiError::Internal)?;
    Ok(TokenPair { access_token: access.token, refresh_token: refresh.plaintext })
}

fn signing_key(cfg: &Config) -> &[u8] {
    // Derived from the database URL so a fresh deployment has a stable,
    // unique signing key without a dedicated secret file; documented in
    // DESIGN.md as an Open Question resolution.
    cfg.database_url.as_bytes()
}

pub async fn login(
    store: &impl Store,
    cfg: &Config,
    username: &str,
    password: &str,
    mfa_code: Option<&str>,
) -> Result<TokenPair, ApiError> {
    let user = store
        .get_user_by_username(username)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Unauthenticated("invalid credentials".into()))?;

    if !verify_password(password, &user.password_hash).map_err(ApiError::Internal)? {
        return Err(ApiError::Unauthenticated("invalid credentials".into()));
    }

    if user.mfa_enabled {
        let secret = user.totp_secret.as_deref().ok_or(ApiError::MfaRequired)?;
        match mfa_code {
            None => return Err(ApiError::MfaRequired),
            Some(code) => {
                let now = Utc::now().timestamp() as u64;
                let ok = verify_code(secret, code, now, &cfg.auth).map_err(ApiError::Internal)?;
                if !ok {
                    let consumed =
                        store.consume_recovery_code(user.id, code).await.map_err(ApiError::Internal)?;
                    if !consumed {
                        return Err(ApiError::MfaInvalid);
                    }
                }
            }
        }
    }

    issue_pair(store, cfg, &user).await
}

pub async fn refresh(store: &impl Store, cfg: &Config, old_refresh_token: &str) -> Result<TokenPair, ApiError> {
    let old_hash = crate::auth::tokens::hash_refresh_token(old_refresh_token);
    let new_plain = issue_refresh_token(cfg.auth.refresh_token_days);
    let new_id = uuid::Uuid::new_v4();

    let outcome = store
        .rotate_refresh_token(&old_hash, new_id, &new_plain.hash, new_plain.expires_at)
        .await
        .map_err(ApiError::Internal)?;

    let rotated = match outcome {
        RotateOutcome::Rotated(r) => r,
        RotateOutcome::StaleOrUnknown => return Err(ApiError::Unauthenticated("refresh token revoked or expired".into())),
    };

    let user = store
        .get_user_by_id(rotated.user_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Unauthenticated("user no longer exists".into()))?;

    let access = issue_access_token(user.id, 0, cfg.auth.access_token_minutes, signing_key(cfg))
        .map_err(ApiError::Internal)?;
    Ok(TokenPair { access_token: access.token, refresh_token: new_plain.plaintext })
}

pub async fn logout(store: &impl Store, user_id: uuid::Uuid) -> Result<(), ApiError> {
    store.revoke_all_refresh_tokens(user_id).await.map_err(ApiError::Internal)?;
    Ok(())
}

pub async fn authenticate(store: &impl Store, cfg: &Config, bearer_token: &str) -> Result<User, ApiError> {
    let claims =
        verify_access_token(bearer_token, signing_key(cfg)).map_err(|e| ApiError::Unauthenticated(e.to_string()))?;
    let user = store
        .get_user_by_id(claims.sub)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Unauthenticated("user no longer exists".into()))?;
    Ok(user)
}

pub struct MfaSetup {
    pub secret: String,
    pub backup_codes: Vec<String>,
}

/// Begin MFA enrollment: generate a secret and backup codes, store them
/// unconfirmed (mfa_enabled stays false until `verify` below proves
/// possession).
pub async fn mfa_setup(store: &impl Store, cfg: &Config, user: &User) -> Result<MfaSetup, ApiError> {
    let secret = generate_secret();
    let codes = generate_backup_codes(cfg.auth.backup_code_count);
    store.update_user_mfa(user.id, Some(&secret), false).await.map_err(ApiError::Internal)?;
    let hashes: Vec<String> = codes.iter().map(|(_, h)| h.clone()).collect();
    store.replace_recovery_codes(user.id, &hashes).await.map_err(ApiError::Internal)?;
    Ok(MfaSetup { secret, backup_codes: codes.into_iter().map(|(plain, _)| plain).collect() })
}

pub async fn mfa_verify(store: &impl Store, cfg: &Config, user: &User, code: &str) -> Result<(), ApiError> {
    let secret = user.totp_secret.as_deref().ok_or_else(|| ApiError::Precondition("mfa not set up".into()))?;
    let now = Utc::now().timestamp() as u64;
    if !verify_code(secret, code, now, &cfg.auth).map_err(ApiError::Internal)? {
        return Err(ApiError::MfaInvalid);
    }
    store.update_user_mfa(user.id, Some(secret), true).await.map_err(ApiError::Internal)?;
    Ok(())
}

pub async fn mfa_disable(store: &impl Store, user: &User, password: &str) -> Result<(), ApiError> {
    if !verify_password(password, &user.password_hash).map_err(ApiError::Internal)? {
        return Err(ApiError::Unauthenticated("invalid credentials".into()));
    }
    store.update_user_mfa(user.id, None, false).await.map_err(ApiError::Internal)?;
    Ok(())
}

pub async fn mfa_regenerate_backup_codes(
    store: &impl Store,
    cfg: &Config,
    user: &User,
) -> Result<Vec<String>, ApiError> {
    let codes = generate_backup_codes(cfg.auth.backup_code_count);
    let hashes: Vec<String> = codes.iter().map(|(_, h)| h.clone()).collect();
    store.replace_recovery_codes(user.id, &hashes).await.map_err(ApiError::Internal)?;
    Ok(codes.into_iter().map(|(plain, _)| plain).collect())
}
