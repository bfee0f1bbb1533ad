#![forbid(unsafe_code)]

//! `POST /reservations`, `POST /reservations/recurring`, `GET
//! /reservations/my`, `POST /reservations/{id}/cancel`, `GET
//! /reservations/{id}/history` (§4.2).

use chrono::{DateTime, NaiveDate, Utc};
use poem::Request;
use poem_openapi::{param::Path, param::Query, payload::Json, Object, OpenApi};
use uuid::Uuid;

use crate::api_response;
use crate::reservations::{self as engine, CreateRequest, RecurrenceRuleSpec, RecurringCreateRequest};
use crate::utils::api_error::ApiError;
use crate::utils::config::ctx;
use crate::utils::db::Store;
use crate::utils::db_types::Reservation;
use crate::utils::reqauth::current_caller;

pub struct ReservationsApi;

#[derive(Object, Debug)]
pub struct RespReservation {
    pub id: String,
    pub user_id: String,
    pub resource_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub recurrence_rule_id: Option<String>,
}

impl From<Reservation> for RespReservation {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            user_id: r.user_id.to_string(),
            resource_id: r.resource_id.to_string(),
            start_time: r.start_time,
            end_time: r.end_time,
            status: r.status,
            recurrence_rule_id: r.recurrence_rule_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Object, Debug)]
pub struct ReqCreateReservation {
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

api_response!(CreateResponse, 201, RespReservation);

#[derive(Object, Debug)]
pub struct ReqRecurrenceRule {
    pub frequency: String,
    pub interval: i32,
    pub days_of_week: Option<i16>,
    pub end_policy: String,
    pub end_date: Option<NaiveDate>,
    pub occurrence_count: Option<i32>,
}

#[derive(Object, Debug)]
pub struct ReqCreateRecurring {
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub rule: ReqRecurrenceRule,
}

#[derive(Object, Debug)]
pub struct RespReservationList {
    pub data: Vec<RespReservation>,
}

api_response!(ListResponse, 200, RespReservationList);
api_response!(GetResponse, 200, RespReservation);
api_response!(CancelResponse, 200, RespReservation);

#[derive(Object, Debug)]
pub struct RespHistoryEntry {
    pub action: String,
    pub actor: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Object, Debug)]
pub struct RespHistory {
    pub data: Vec<RespHistoryEntry>,
}

api_response!(HistoryResponse, 200, RespHistory);

#[derive(Object, Debug)]
pub struct ReqCancel {
    pub reason: Option<String>,
}

#[OpenApi]
impl ReservationsApi {
    #[oai(path = "/reservations", method = "post")]
    async fn create(&self, http_req: &Request, req: Json<ReqCreateReservation>) -> CreateResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return CreateResponse::err(e),
        };
        let result = engine::create(
            &ctx().store,
            &ctx().bus,
            &ctx().parms.config,
            CreateRequest { user_id: caller.id(), resource_id: req.resource_id, start_time: req.start_time, end_time: req.end_time },
        )
        .await;
        match result {
            Ok(r) => CreateResponse::ok(r.into()),
            Err(e) => CreateResponse::err(e),
        }
    }

    #[oai(path = "/reservations/recurring", method = "post")]
    async fn create_recurring(&self, http_req: &Request, req: Json<ReqCreateRecurring>) -> ListResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return ListResponse::err(e),
        };
        let result = engine::create_recurring(
            &ctx().store,
            &ctx().bus,
            &ctx().parms.config,
            RecurringCreateRequest {
                user_id: caller.id(),
                resource_id: req.resource_id,
                start_time: req.start_time,
                end_time: req.end_time,
                rule: RecurrenceRuleSpec {
                    frequency: req.rule.frequency.clone(),
                    interval: req.rule.interval,
                    days_of_week: req.rule.days_of_week,
                    end_policy: req.rule.end_policy.clone(),
                    end_date: req.rule.end_date,
                    occurrence_count: req.rule.occurrence_count,
                },
            },
        )
        .await;
        match result {
            Ok(rows) => ListResponse::ok(RespReservationList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ListResponse::err(e),
        }
    }

    #[oai(path = "/reservations/my", method = "get")]
    async fn list_mine(&self, http_req: &Request, limit: Query<Option<i64>>, offset: Query<Option<i64>>) -> ListResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return ListResponse::err(e),
        };
        let result = ctx().store.reservations_for_user(caller.id(), limit.0.unwrap_or(50), offset.0.unwrap_or(0)).await;
        match result {
            Ok(rows) => ListResponse::ok(RespReservationList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ListResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/reservations/:id", method = "get")]
    async fn get(&self, http_req: &Request, id: Path<Uuid>) -> GetResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return GetResponse::err(e),
        };
        match ctx().store.get_reservation(id.0).await {
            Ok(Some(r)) if r.user_id == caller.id() || caller.can(crate::auth::policy::Action::ViewAnyReservation) => {
                GetResponse::ok(r.into())
            }
            Ok(Some(_)) => GetResponse::err(ApiError::Forbidden("reservation belongs to another user".into())),
            Ok(None) => GetResponse::err(ApiError::NotFound("reservation not found".into())),
            Err(e) => GetResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/reservations/:id/cancel", method = "post")]
    async fn cancel(&self, http_req: &Request, id: Path<Uuid>, req: Json<ReqCancel>) -> CancelResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return CancelResponse::err(e),
        };
        let existing = match ctx().store.get_reservation(id.0).await {
            Ok(Some(r)) => r,
            Ok(None) => return CancelResponse::err(ApiError::NotFound("reservation not found".into())),
            Err(e) => return CancelResponse::err(ApiError::Internal(e)),
        };
        let owns = existing.user_id == caller.id();
        let privileged = caller.can(crate::auth::policy::Action::CancelAnyReservation);
        if !owns && !privileged {
            return CancelResponse::err(ApiError::Forbidden("reservation belongs to another user".into()));
        }
        let result =
            engine::cancel(&ctx().store, &ctx().bus, &ctx().parms.config, id.0, caller.id(), privileged, req.reason.as_deref()).await;
        match result {
            Ok(r) => CancelResponse::ok(r.into()),
            Err(e) => CancelResponse::err(e),
        }
    }

    #[oai(path = "/reservations/:id/history", method = "get")]
    async fn history(&self, http_req: &Request, id: Path<Uuid>) -> HistoryResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return HistoryResponse::err(e),
        };
        let existing = match ctx().store.get_reservation(id.0).await {
            Ok(Some(r)) => r,
            Ok(None) => return HistoryResponse::err(ApiError::NotFound("reservation not found".into())),
            Err(e) => return HistoryResponse::err(ApiError::Internal(e)),
        };
        if existing.user_id != caller.id() && !caller.can(crate::auth::policy::Action::ViewAnyReservation) {
            return HistoryResponse::err(ApiError::Forbidden("reservation belongs to another user".into()));
        }
        match ctx().store.reservation_history(id.0).await {
            Ok(rows) => HistoryResponse::ok(RespHistory {
                data: rows
                    .into_iter()
                    .map(|h| RespHistoryEntry { action: h.action, actor: h.actor.to_string(), details: h.details, created_at: h.created_at })
                    .collect(),
            }),
            Err(e) => HistoryResponse::err(ApiError::Internal(e)),
        }
    }
}
