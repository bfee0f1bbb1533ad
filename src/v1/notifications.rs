#![forbid(unsafe_code)]

//! `GET /notifications`, `POST /notifications/{id}/read`, `POST
//! /notifications/mark-all-read`.

use chrono::{DateTime, Utc};
use poem::Request;
use poem_openapi::{param::Path, param::Query, Object, OpenApi};
use uuid::Uuid;

use crate::api_response;
use crate::utils::api_error::ApiError;
use crate::utils::config::ctx;
use crate::utils::db::Store;
use crate::utils::db_types::Notification;
use crate::utils::reqauth::current_caller;

pub struct NotificationsApi;

#[derive(Object, Debug)]
pub struct RespNotification {
    pub id: String,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for RespNotification {
    fn from(n: Notification) -> Self {
        Self { id: n.id.to_string(), kind: n.kind, message: n.message, read: n.read, link: n.link, created_at: n.created_at }
    }
}

#[derive(Object, Debug)]
pub struct RespNotificationList {
    pub data: Vec<RespNotification>,
}

api_response!(ListResponse, 200, RespNotificationList);

#[derive(Object, Debug)]
pub struct Empty {}

api_response!(MarkReadResponse, 204, Empty);

#[derive(Object, Debug)]
pub struct RespMarkedCount {
    pub marked: u64,
}

api_response!(MarkAllResponse, 200, RespMarkedCount);

#[OpenApi]
impl NotificationsApi {
    #[oai(path = "/notifications", method = "get")]
    async fn list(&self, http_req: &Request, limit: Query<Option<i64>>, offset: Query<Option<i64>>) -> ListResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return ListResponse::err(e),
        };
        match ctx().store.notifications_for_user(caller.id(), limit.0.unwrap_or(50), offset.0.unwrap_or(0)).await {
            Ok(rows) => ListResponse::ok(RespNotificationList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ListResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/notifications/:id/read", method = "post")]
    async fn mark_read(&self, http_req: &Request, id: Path<Uuid>) -> MarkReadResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return MarkReadResponse::err(e),
        };
        match ctx().store.mark_notification_read(id.0, caller.id()).await {
            Ok(true) => MarkReadResponse::ok(Empty {}),
            Ok(false) => MarkReadResponse::err(ApiError::NotFound("notification not found".into())),
            Err(e) => MarkReadResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/notifications/mark-all-read", method = "post")]
    async fn mark_all_read(&self, http_req: &Request) -> MarkAllResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return MarkAllResponse::err(e),
        };
        match ctx().store.mark_all_notifications_read(caller.id()).await {
            Ok(n) => MarkAllResponse::ok(RespMarkedCount { marked: n }),
            Err(e) => MarkAllResponse::err(ApiError::Internal(e)),
        }
    }
}
