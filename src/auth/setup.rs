#![forbid(unsafe_code)]

//! The one-shot first-admin bootstrap (§4.1 "Setup gate").
//!
//! `initialize` is permitted while `user_count == 0` or `setup_reopened`.
//! Once it succeeds, the gate locks: `setup_complete = true`,
//! `setup_reopened = false`. Presenting a valid `X-Setup-Token` against a
//! locked gate reopens it for exactly this call. Open Question (b) --
//! whether that unlock token survives one use or can be presented again --
//! is resolved by `AuthConfig::setup_unlock_token_single_use` (default
//! `true`: the stored hash is cleared after the reopen succeeds, so a
//! fresh token must be provisioned by an operator for any further reopen).

use anyhow::Result;
use uuid::Uuid;

use crate::auth::password::{check_password_policy, hash_password};
use crate::auth::totp::hash_backup_code as hash_opaque_token;
use crate::utils::api_error::ApiError;
use crate::utils::config::Config;
use crate::utils::db::Store;
use crate::utils::db_types::{SetupState, User, UserInput};

pub struct SetupStatus {
    pub setup_complete: bool,
    pub setup_reopened: bool,
    pub user_count: i64,
}

pub async fn get_status(store: &impl Store) -> Result<SetupStatus> {
    let state = store.get_setup_state().await?;
    let user_count = store.count_users().await?;
    Ok(SetupStatus { setup_complete: state.setup_complete, setup_reopened: state.setup_reopened, user_count })
}

/// Provision (or replace) the out-of-band unlock token. Not exposed over
/// HTTP -- operators set this through their own deployment tooling, per
/// the external-interfaces list which names no endpoint for it.
pub async fn set_unlock_token(store: &impl Store, plaintext: &str) -> Result<()> {
    let mut state = store.get_setup_state().await?;
    state.unlock_token_hash = Some(hash_opaque_token(plaintext));
    store.update_setup_state(&state).await?;
    Ok(())
}

pub struct InitializeRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub unlock_token: Option<&'a str>,
}

pub async fn initialize(store: &impl Store, cfg: &Config, req: InitializeRequest<'_>) -> Result<User, ApiError> {
    let mut state = store.get_setup_state().await.map_err(ApiError::Internal)?;
    let user_count = store.count_users().await.map_err(ApiError::Internal)?;

    let gate_open = user_count == 0 || state.setup_reopened;
    let reopened_via_token = if !gate_open {
        match (&state.unlock_token_hash, req.unlock_token) {
            (Some(stored), Some(candidate)) if *stored == hash_opaque_token(candidate) => true,
            _ => return Err(ApiError::Conflict("setup_locked".into(), vec![])),
        }
    } else {
        false
    };

    check_password_policy(req.password, req.username)?;

    let existing = store.get_user_by_username(req.username).await.map_err(ApiError::Internal)?;
    let user = match existing {
        Some(u) => {
            store.assign_role(u.id, "admin").await.map_err(ApiError::Internal)?;
            u
        }
        None => {
            let hash = hash_password(req.password, &cfg.auth).map_err(ApiError::Internal)?;
            let created =
                store.insert_user(UserInput::new(req.username.to_string(), hash)).await.map_err(ApiError::Internal)?;
            store.assign_role(created.id, "admin").await.map_err(ApiError::Internal)?;
            created
        }
    };

    state.setup_complete = true;
    state.setup_reopened = false;
    if reopened_via_token && cfg.auth.setup_unlock_token_single_use {
        state.unlock_token_hash = None;
    }
    store.update_setup_state(&state).await.map_err(ApiError::Internal)?;
    store
        .append_audit("setup", Uuid::nil(), "setup.initialized", Some(user.id), serde_json::json!({}))
        .await
        .map_err(ApiError::Internal)?;

    Ok(user)
}

/// Reopen the setup gate directly (operator/admin action, not an HTTP
/// endpoint named in the external-interfaces list).
pub async fn reopen(store: &impl Store) -> Result<()> {
    let mut state: SetupState = store.get_setup_state().await?;
    state.setup_reopened = true;
    store.update_setup_state(&state).await?;
    Ok(())
}
