#![forbid(unsafe_code)]

//! `GET/POST/PUT /resources`, `GET /resources/search`, and the
//! per-resource read endpoints backed by `availability` (§4.4).

use chrono::{DateTime, Utc};
use poem::Request;
use poem_openapi::{param::Path, param::Query, payload::Json, Object, OpenApi};
use uuid::Uuid;

use crate::api_response;
use crate::auth::policy::Action;
use crate::availability;
use crate::utils::api_error::ApiError;
use crate::utils::config::ctx;
use crate::utils::db::Store;
use crate::utils::db_types::{Resource, ResourceInput};
use crate::utils::reqauth::current_caller;

pub struct ResourcesApi;

#[derive(Object, Debug)]
pub struct RespResource {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub base_available: bool,
    pub status: String,
}

impl From<Resource> for RespResource {
    fn from(r: Resource) -> Self {
        Self { id: r.id.to_string(), name: r.name, description: r.description, tags: r.tags, base_available: r.base_available, status: r.status }
    }
}

#[derive(Object, Debug)]
pub struct RespResourceList {
    pub data: Vec<RespResource>,
}

api_response!(ListResponse, 200, RespResourceList);

#[derive(Object, Debug)]
pub struct ReqCreateResource {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub base_available: bool,
}

api_response!(CreateResponse, 201, RespResource);

#[derive(Object, Debug)]
pub struct ReqUpdateResourceStatus {
    pub status: String,
}

api_response!(UpdateResponse, 200, RespResource);

#[derive(Object, Debug)]
pub struct RespTimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<availability::TimeSlot> for RespTimeSlot {
    fn from(s: availability::TimeSlot) -> Self {
        Self { start: s.start, end: s.end }
    }
}

#[derive(Object, Debug)]
pub struct RespSlots {
    pub data: Vec<RespTimeSlot>,
}

api_response!(SlotsResponse, 200, RespSlots);

#[derive(Object, Debug)]
pub struct RespScheduleSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
    pub reason: Option<String>,
}

impl From<availability::ScheduleSegment> for RespScheduleSegment {
    fn from(s: availability::ScheduleSegment) -> Self {
        let reason = s.reason.map(|r| match r {
            availability::UnavailableReason::Reserved => "reserved",
            availability::UnavailableReason::Closed => "closed",
            availability::UnavailableReason::Blackout => "blackout",
            availability::UnavailableReason::Disabled => "disabled",
        }.to_string());
        Self { start: s.start, end: s.end, available: s.available, reason }
    }
}

#[derive(Object, Debug)]
pub struct RespSchedule {
    pub data: Vec<RespScheduleSegment>,
}

api_response!(ScheduleResponse, 200, RespSchedule);

#[derive(Object, Debug)]
pub struct RespUtilization {
    pub resource_id: String,
    pub open_minutes: i64,
    pub reserved_minutes: i64,
    pub utilization_pct: f64,
}

api_response!(UtilizationResponse, 200, RespUtilization);

#[derive(Object, Debug)]
pub struct RespAvailabilitySummary {
    pub available_now: i64,
    pub currently_reserved: i64,
    pub administratively_unavailable: i64,
}

api_response!(SummaryResponse, 200, RespAvailabilitySummary);

#[derive(Object, Debug)]
pub struct RespNextAvailable {
    pub slot: Option<RespTimeSlot>,
}

api_response!(NextAvailableResponse, 200, RespNextAvailable);

async fn require_manage(http_req: &Request) -> Result<(), ApiError> {
    let caller = current_caller(&ctx().store, &ctx().parms.config, http_req).await?;
    caller.require(Action::ManageResources)
}

#[OpenApi]
impl ResourcesApi {
    #[oai(path = "/resources", method = "get")]
    async fn list(&self) -> ListResponse {
        match ctx().store.list_resources().await {
            Ok(rows) => ListResponse::ok(RespResourceList { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ListResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/resources/search", method = "get")]
    async fn search(&self, q: Query<Option<String>>) -> ListResponse {
        let rows = match ctx().store.list_resources().await {
            Ok(r) => r,
            Err(e) => return ListResponse::err(ApiError::Internal(e)),
        };
        let needle = q.0.unwrap_or_default().to_lowercase();
        let data = rows
            .into_iter()
            .filter(|r| needle.is_empty() || r.name.to_lowercase().contains(&needle) || r.tags.iter().any(|t| t.to_lowercase().contains(&needle)))
            .map(Into::into)
            .collect();
        ListResponse::ok(RespResourceList { data })
    }

    #[oai(path = "/resources", method = "post")]
    async fn create(&self, http_req: &Request, req: Json<ReqCreateResource>) -> CreateResponse {
        if let Err(e) = require_manage(http_req).await {
            return CreateResponse::err(e);
        }
        let input = ResourceInput { name: req.name.clone(), description: req.description.clone(), tags: req.tags.clone(), base_available: req.base_available };
        match ctx().store.insert_resource(input).await {
            Ok(r) => CreateResponse::ok(r.into()),
            Err(e) => CreateResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/resources/:id", method = "put")]
    async fn update_status(&self, http_req: &Request, id: Path<Uuid>, req: Json<ReqUpdateResourceStatus>) -> UpdateResponse {
        if let Err(e) = require_manage(http_req).await {
            return UpdateResponse::err(e);
        }
        if let Err(e) = ctx().store.update_resource_status(id.0, &req.status, None).await {
            return UpdateResponse::err(ApiError::Internal(e));
        }
        match ctx().store.get_resource(id.0).await {
            Ok(Some(r)) => UpdateResponse::ok(r.into()),
            Ok(None) => UpdateResponse::err(ApiError::NotFound("resource not found".into())),
            Err(e) => UpdateResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/resources/:id/status", method = "get")]
    async fn status(&self, id: Path<Uuid>) -> UpdateResponse {
        match ctx().store.get_resource(id.0).await {
            Ok(Some(r)) => UpdateResponse::ok(r.into()),
            Ok(None) => UpdateResponse::err(ApiError::NotFound("resource not found".into())),
            Err(e) => UpdateResponse::err(ApiError::Internal(e)),
        }
    }

    #[oai(path = "/resources/:id/schedule", method = "get")]
    async fn schedule(
        &self,
        id: Path<Uuid>,
        from: Query<DateTime<Utc>>,
        to: Query<DateTime<Utc>>,
        granularity_minutes: Query<Option<i64>>,
    ) -> ScheduleResponse {
        match availability::schedule(&ctx().store, id.0, from.0, to.0, granularity_minutes.0.unwrap_or(60)).await {
            Ok(rows) => ScheduleResponse::ok(RespSchedule { data: rows.into_iter().map(Into::into).collect() }),
            Err(e) => ScheduleResponse::err(e),
        }
    }

    #[oai(path = "/resources/:id/available-slots", method = "get")]
    async fn available_slots(&self, id: Path<Uuid>, from: Query<DateTime<Utc>>, to: Query<DateTime<Utc>>) -> SlotsResponse {
        match availability::available_slots(&ctx().store, id.0, from.0, to.0).await {
            Ok(slots) => SlotsResponse::ok(RespSlots { data: slots.into_iter().map(Into::into).collect() }),
            Err(e) => SlotsResponse::err(e),
        }
    }

    #[oai(path = "/resources/:id/availability", method = "get")]
    async fn availability_utilization(&self, id: Path<Uuid>, from: Query<DateTime<Utc>>, to: Query<DateTime<Utc>>) -> UtilizationResponse {
        match availability::utilization(&ctx().store, id.0, from.0, to.0).await {
            Ok(s) => UtilizationResponse::ok(RespUtilization {
                resource_id: s.resource_id.to_string(),
                open_minutes: s.open_minutes,
                reserved_minutes: s.reserved_minutes,
                utilization_pct: s.utilization_pct,
            }),
            Err(e) => UtilizationResponse::err(e),
        }
    }

    #[oai(path = "/resources/summary", method = "get")]
    async fn summary(&self) -> SummaryResponse {
        match availability::summary(&ctx().store).await {
            Ok(s) => SummaryResponse::ok(RespAvailabilitySummary {
                available_now: s.available_now,
                currently_reserved: s.currently_reserved,
                administratively_unavailable: s.administratively_unavailable,
            }),
            Err(e) => SummaryResponse::err(e),
        }
    }

    #[oai(path = "/resources/:id/next-available", method = "get")]
    async fn next_available(&self, id: Path<Uuid>, after: Query<DateTime<Utc>>, duration_minutes: Query<i64>) -> NextAvailableResponse {
        match availability::next_available(&ctx().store, id.0, after.0, duration_minutes.0).await {
            Ok(slot) => NextAvailableResponse::ok(RespNextAvailable { slot: slot.map(Into::into) }),
            Err(e) => NextAvailableResponse::err(e),
        }
    }
}
