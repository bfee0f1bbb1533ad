#![forbid(unsafe_code)]

//! `POST/GET/PATCH/DELETE /webhooks`, `GET /webhooks/{id}/deliveries`,
//! `POST /webhooks/{id}/deliveries/{d}/retry` (§4.6). Management is
//! restricted to `Action::ManageWebhooks`, same as resource management.

use chrono::{DateTime, Utc};
use poem::Request;
use poem_openapi::{param::Path, payload::Json, Object, OpenApi};
use rand::distributions::{Alphanumeric, DistString};
use uuid::Uuid;

use crate::api_response;
use crate::auth::policy::Action;
use crate::utils::api_error::ApiError;
use crate::utils::config::ctx;
use crate::utils::db::Store;
use crate::utils::db_types::{Webhook, WebhookDelivery};
use crate::utils::reqauth::current_caller;
use crate::webhooks;

pub struct WebhooksApi;

#[derive(Object, Debug)]
pub struct RespWebhook {
    pub id: String,
    pub url: String,
    pub event_filter: Vec<String>,
    pub active: bool,
    pub consecutive_final_failures: i32,
}

impl From<Webhook> for RespWebhook {
    fn from(w: Webhook) -> Self {
        Self { id: w.id.to_string(), url: w.url, event_filter: w.event_filter, active: w.active, consecutive_final_failures: w.consecutive_final_failures }
    }
}

#[derive(Object, Debug)]
pub struct RespWebhookCreated {
    pub id: String,
    pub url: String,
    pub event_filter: Vec<String>,
    pub secret: String,
}

#[derive(Object, Debug)]
pub struct ReqCreateWebhook {
    pub url: String,
    pub event_filter: Vec<String>,
}

api_response!(CreateResponse, 201, RespWebhookCreated);

#[derive(Object, Debug)]
pub struct RespWebhookList {
    pub data: Vec<RespWebhook>,
}

api_response!(ListResponse, 200, RespWebhookList);
api_response!(GetResponse, 200, RespWebhook);

#[derive(Object, Debug)]
pub struct ReqPatchWebhook {
    pub active: bool,
}

api_response!(PatchResponse, 200, RespWebhook);

#[derive(poem_openapi::ApiResponse)]
pub enum DeleteResponse {
    #[oai(status = 204)]
    NoContent,
    #[oai(status = 403)]
    Forbidden(Json<crate::utils::api_error::ErrorBody>),
    #[oai(status = 500)]
    Internal(Json<crate::utils::api_error::ErrorBody>),
}

#[derive(Object, Debug)]
pub struct RespDelivery {
    pub id: String,
    pub event_type: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub status_code: Option<i32>,
    pub delivered: bool,
}

impl From<WebhookDelivery> for RespDelivery {
    fn from(d: WebhookDelivery) -> Self {
        Self { id: d.id.to_string(), event_type: d.event_type, attempt_count: d.attempt_count, next_retry_at: d.next_retry_at, status_code: d.status_code, delivered: d.delivered }
    }
}

#[derive(Object, Debug)]
pub struct RespDeliveryList {
    pub data: Vec<RespDelivery>,
}

api_response!(DeliveriesResponse, 200, RespDeliveryList);

#[derive(Object, Debug)]
pub struct RespRetry {
    pub requeued: bool,
}

api_response!(RetryResponse, 200, RespRetry);

async fn require_manage(http_req: &Request) -> Result<(), ApiError> {
    let caller = current_caller(&ctx().store, &ctx().parms.config, http_req).await?;
    caller.require(Action::ManageWebhooks)
}

#[OpenApi]
impl WebhooksApi {
    #[oai(path = "/webhooks", method = "post")]
    async fn create(&self, http_req: &Request, req: Json<ReqCreateWebhook>) -> CreateResponse {
        if let Err(e) = require_manage(http_req).await {
            return CreateResponse::err(e);
        }
        let secret = Alphanumeric.sample_string(&mut rand::thread_rng(), 32);
        match ctx().store.insert_webhook(&req.url, &req.event_filter, &secret).await {
            Ok(w) => CreateResponse::ok(RespWebhookCreated { id: w.id.to_string(), url: w.url, event_filter: w.event_filter, secret }),
            Err(e) => CreateResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/webhooks", method = "get")]
    async fn list(&self, http_req: &Request) -> ListResponse {
        if let Err(e) = require_manage(http_req).await {
            return ListResponse::err(e);
        }
        match ctx().store.list_webhooks().await {
            Ok(rows) => ListResponse::ok(RespWebhookList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ListResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/webhooks/:id", method = "get")]
    async fn get(&self, http_req: &Request, id: Path<Uuid>) -> GetResponse {
        if let Err(e) = require_manage(http_req).await {
            return GetResponse::err(e);
        }
        match ctx().store.get_webhook(id.0).await {
            Ok(Some(w)) => GetResponse::ok(w.into()),
            Ok(None) => GetResponse::err(ApiError::NotFound("webhook not found".into())),
            Err(e) => GetResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/webhooks/:id", method = "patch")]
    async fn patch(&self, http_req: &Request, id: Path<Uuid>, req: Json<ReqPatchWebhook>) -> PatchResponse {
        if let Err(e) = require_manage(http_req).await {
            return PatchResponse::err(e);
        }
        if let Err(e) = ctx().store.set_webhook_active(id.0, req.active).await {
            return PatchResponse::err(ApiError::Internal(e));
        }
        match ctx().store.get_webhook(id.0).await {
            Ok(Some(w)) => PatchResponse::ok(w.into()),
            Ok(None) => PatchResponse::err(ApiError::NotFound("webhook not found".into())),
            Err(e) => PatchResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/webhooks/:id", method = "delete")]
    async fn delete(&self, http_req: &Request, id: Path<Uuid>) -> DeleteResponse {
        if let Err(e) = require_manage(http_req).await {
            return DeleteResponse::Forbidden(Json(e.body()));
        }
        match ctx().store.delete_webhook(id.0).await {
            Ok(()) => DeleteResponse::NoContent,
            Err(e) => DeleteResponse::Internal(Json(ApiError::Internal(e).body())),
        }
    }

    #[oai(path = "/webhooks/:id/deliveries", method = "get")]
    async fn deliveries(&self, http_req: &Request, id: Path<Uuid>, limit: poem_openapi::param::Query<Option<i64>>, offset: poem_openapi::param::Query<Option<i64>>) -> DeliveriesResponse {
        if let Err(e) = require_manage(http_req).await {
            return DeliveriesResponse::err(e);
        }
        match ctx().store.deliveries_for_webhook(id.0, limit.0.unwrap_or(50), offset.0.unwrap_or(0)).await {
            Ok(rows) => DeliveriesResponse::ok(RespDeliveryList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => DeliveriesResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/webhooks/:id/deliveries/:delivery_id/retry", method = "post")]
    async fn retry(&self, http_req: &Request, id: Path<Uuid>, delivery_id: Path<Uuid>) -> RetryResponse {
        if let Err(e) = require_manage(http_req).await {
            return RetryResponse::err(e);
        }
        match webhooks::retry_delivery(&ctx().store, id.0, delivery_id.0).await {
            Ok(requeued) => RetryResponse::ok(RespRetry { requeued }),
            Err(e) => RetryResponse::err(ApiError::Internal(e)),
        }
    }
}
