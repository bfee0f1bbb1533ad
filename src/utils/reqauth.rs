#![forbid(unsafe_code)]

//! Bearer-token extraction for protected `v1` endpoints. The teacher's
//! `authz.rs` reads id/secret headers and checks them against the
//! database synchronously via `block_on`; this is native-async instead,
//! but keeps the same "check headers, resolve the caller, return a bool
//! or a principal" shape.

use poem::Request;
use uuid::Uuid;

use crate::auth::service::authenticate;
use crate::auth::policy::{is_allowed, Action};
use crate::utils::api_error::ApiError;
use crate::utils::config::Config;
use crate::utils::db::Store;
use crate::utils::db_types::User;

pub struct Caller {
    pub user: User,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn can(&self, action: Action) -> bool {
        is_allowed(&self.roles, action)
    }

    pub fn require(&self, action: Action) -> Result<(), ApiError> {
        if self.can(action) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("missing grant for {action:?}")))
        }
    }
}

fn bearer_token(http_req: &Request) -> Option<&str> {
    http_req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the caller from the request's `Authorization: Bearer <token>`
/// header. Used at the top of every protected handler before `process()`.
pub async fn current_caller(store: &impl Store, cfg: &Config, http_req: &Request) -> Result<Caller, ApiError> {
    let token = bearer_token(http_req).ok_or_else(|| ApiError::Unauthenticated("missing bearer token".into()))?;
    let user = authenticate(store, cfg, token).await?;
    let roles = store.roles_for_user(user.id).await.map_err(ApiError::Internal)?;
    Ok(Caller { user, roles })
}
