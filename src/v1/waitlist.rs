#![forbid(unsafe_code)]

//! `POST /waitlist`, `GET /waitlist`, `POST /waitlist/{id}/accept`,
//! `DELETE /waitlist/{id}` (§4.3).

use chrono::{DateTime, Utc};
use poem::Request;
use poem_openapi::{param::Path, payload::Json, Object, OpenApi};
use uuid::Uuid;

use crate::api_response;
use crate::utils::api_error::ApiError;
use crate::utils::config::ctx;
use crate::utils::db::Store;
use crate::utils::db_types::WaitlistEntry;
use crate::utils::reqauth::current_caller;
use crate::v1::reservations::RespReservation;
use crate::waitlist;

pub struct WaitlistApi;

#[derive(Object, Debug)]
pub struct RespWaitlistEntry {
    pub id: String,
    pub resource_id: String,
    pub desired_start: DateTime<Utc>,
    pub desired_end: DateTime<Utc>,
    pub flexible_time: bool,
    pub state: String,
    pub offer_expires_at: Option<DateTime<Utc>>,
}

impl From<WaitlistEntry> for RespWaitlistEntry {
    fn from(e: WaitlistEntry) -> Self {
        Self {
            id: e.id.to_string(),
            resource_id: e.resource_id.to_string(),
            desired_start: e.desired_start,
            desired_end: e.desired_end,
            flexible_time: e.flexible_time,
            state: e.state,
            offer_expires_at: e.offer_expires_at,
        }
    }
}

#[derive(Object, Debug)]
pub struct ReqJoinWaitlist {
    pub resource_id: Uuid,
    pub desired_start: DateTime<Utc>,
    pub desired_end: DateTime<Utc>,
    pub flexible_time: bool,
}

api_response!(JoinResponse, 201, RespWaitlistEntry);

#[derive(Object, Debug)]
pub struct RespWaitlistList {
    pub data: Vec<RespWaitlistEntry>,
}

api_response!(ListResponse, 200, RespWaitlistList);
api_response!(AcceptResponse, 200, RespReservation);

#[derive(poem_openapi::ApiResponse)]
pub enum LeaveResponse {
    #[oai(status = 204)]
    NoContent,
    #[oai(status = 403)]
    Forbidden(Json<crate::utils::api_error::ErrorBody>),
    #[oai(status = 404)]
    NotFound(Json<crate::utils::api_error::ErrorBody>),
    #[oai(status = 500)]
    Internal(Json<crate::utils::api_error::ErrorBody>),
}

#[OpenApi]
impl WaitlistApi {
    #[oai(path = "/waitlist", method = "post")]
    async fn join(&self, http_req: &Request, req: Json<ReqJoinWaitlist>) -> JoinResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return JoinResponse::err(e),
        };
        let result = waitlist::join(&ctx().store, &ctx().bus, caller.id(), req.resource_id, req.desired_start, req.desired_end, req.flexible_time).await;
        match result {
            Ok(entry) => JoinResponse::ok(entry.into()),
            Err(e) => JoinResponse::err(e),
        }
    }

    #[oai(path = "/waitlist", method = "get")]
    async fn list_mine(&self, http_req: &Request) -> ListResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return ListResponse::err(e),
        };
        match ctx().store.waitlist_for_user(caller.id()).await {
            Ok(rows) => ListResponse::ok(RespWaitlistList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ListResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/waitlist/:id/accept", method = "post")]
    async fn accept(&self, http_req: &Request, id: Path<Uuid>) -> AcceptResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return AcceptResponse::err(e),
        };
        match waitlist::accept(&ctx().store, &ctx().bus, &ctx().parms.config, id.0, caller.id()).await {
            Ok(r) => AcceptResponse::ok(r.into()),
            Err(e) => AcceptResponse::err(e),
        }
    }

    #[oai(path = "/waitlist/:id", method = "delete")]
    async fn leave(&self, http_req: &Request, id: Path<Uuid>) -> LeaveResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => {
                return LeaveResponse::Forbidden(Json(e.body()));
            }
        };
        match waitlist::leave(&ctx().store, id.0, caller.id()).await {
            Ok(()) => LeaveResponse::NoContent,
            Err(e @ ApiError::NotFound(_)) => LeaveResponse::NotFound(Json(e.body())),
            Err(e @ ApiError::Forbidden(_)) => LeaveResponse::Forbidden(Json(e.body())),
            Err(e) => LeaveResponse::Internal(Json(e.body())),
        }
    }
}
