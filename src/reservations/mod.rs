#![forbid(unsafe_code)]

//! Reservation creation, cancellation and the expiry sweep (§4.2/§4.3).
//! Service functions are free functions over `&impl Store`, the same shape
//! `auth::service` uses, so the parts that don't need a database (interval
//! validation, overlap predicates) are unit-testable without one.

pub mod recurrence;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use uuid::Uuid;

use crate::events::{Bus, Topic};
use crate::utils::api_error::ApiError;
use crate::utils::config::{Config, ReservationConfig};
use crate::utils::db::{CreateManyOutcome, CreateOutcome, Store};
use crate::utils::db_types::{Reservation, ReservationInput, RecurrenceRule};

fn validate_interval(start: DateTime<Utc>, end: DateTime<Utc>, cfg: &ReservationConfig) -> Result<(), ApiError> {
    if start >= end {
        return Err(ApiError::Validation("start_time must be before end_time".into()));
    }
    let minutes = (end - start).num_minutes();
    if minutes < cfg.min_duration_minutes {
        return Err(ApiError::Validation(format!("duration below minimum of {} minutes", cfg.min_duration_minutes)));
    }
    if minutes > cfg.max_duration_minutes {
        return Err(ApiError::Validation(format!("duration exceeds maximum of {} minutes", cfg.max_duration_minutes)));
    }
    if start < Utc::now() - Duration::minutes(cfg.grace_minutes) {
        return Err(ApiError::Validation("start_time is in the past".into()));
    }
    Ok(())
}

async fn check_business_hours(store: &impl Store, resource_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, ApiError> {
    let mut hours = store.business_hours_for_resource(resource_id).await.map_err(ApiError::Internal)?;
    if hours.is_empty() {
        hours = store.global_business_hours().await.map_err(ApiError::Internal)?;
    }
    if hours.is_empty() {
        return Ok(true);
    }
    if start.date_naive() != end.date_naive() {
        // Crossing midnight can't satisfy a single day's window.
        return Ok(false);
    }
    let weekday = start.weekday().num_days_from_sunday() as i16;
    let start_minute = start.hour() as i32 * 60 + start.minute() as i32;
    let end_minute = end.hour() as i32 * 60 + end.minute() as i32;
    Ok(match hours.iter().find(|h| h.weekday == weekday) {
        Some(h) if !h.closed => start_minute >= h.open_minute && end_minute <= h.close_minute,
        _ => false,
    })
}

async fn check_blackouts(store: &impl Store, resource_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, ApiError> {
    let blackouts = store
        .blackouts_in_range(resource_id, start.date_naive(), end.date_naive())
        .await
        .map_err(ApiError::Internal)?;
    Ok(blackouts.is_empty())
}

async fn admission_check(store: &impl Store, cfg: &Config, resource_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ApiError> {
    let resource = store.get_resource(resource_id).await.map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("resource not found".into()))?;
    if !resource.base_available || resource.status != "available" {
        return Err(ApiError::Conflict("resource_unavailable".into(), vec![]));
    }
    if cfg.reservations.enforce_business_hours && !check_business_hours(store, resource_id, start, end).await? {
        return Err(ApiError::Validation("outside business hours".into()));
    }
    if !check_blackouts(store, resource_id, start, end).await? {
        return Err(ApiError::Conflict("blackout_date".into(), vec![]));
    }
    Ok(())
}

async fn check_quota(store: &impl Store, user_id: Uuid, start: DateTime<Utc>, cfg: &ReservationConfig) -> Result<(), ApiError> {
    let day_start = start.date_naive().and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
    let day_end = day_start + Duration::days(1);
    let count = store.count_user_reservations_on_day(user_id, day_start, day_end).await.map_err(ApiError::Internal)?;
    if count >= cfg.daily_quota_per_user {
        return Err(ApiError::QuotaExceeded(format!("daily quota of {} reservations reached", cfg.daily_quota_per_user)));
    }
    Ok(())
}

fn publish_created(bus: &Bus, r: &Reservation) {
    let payload = serde_json::to_value(r).unwrap_or(serde_json::json!({}));
    bus.publish(Topic::Resource(r.resource_id), "reservation.created", payload.clone());
    bus.publish(Topic::User(r.user_id), "reservation.created", payload);
}

fn publish_cancelled(bus: &Bus, r: &Reservation) {
    let payload = serde_json::to_value(r).unwrap_or(serde_json::json!({}));
    bus.publish(Topic::Resource(r.resource_id), "reservation.cancelled", payload.clone());
    bus.publish(Topic::User(r.user_id), "reservation.cancelled", payload);
}

pub struct CreateRequest {
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

pub async fn create(store: &impl Store, bus: &Bus, cfg: &Config, req: CreateRequest) -> Result<Reservation, ApiError> {
    validate_interval(req.start_time, req.end_time, &cfg.reservations)?;
    admission_check(store, cfg, req.resource_id, req.start_time, req.end_time).await?;
    check_quota(store, req.user_id, req.start_time, &cfg.reservations).await?;

    let id = Uuid::new_v4();
    let input = ReservationInput::new(id, req.user_id, req.resource_id, req.start_time, req.end_time, None, None);
    match store.create_reservation_if_no_conflict(input).await.map_err(ApiError::Internal)? {
        CreateOutcome::Conflict(conflicts) => {
            let ids = conflicts.iter().map(|r| r.id.to_string()).collect();
            Err(ApiError::Conflict("reservation_conflict".into(), ids))
        }
        CreateOutcome::Created(r) => {
            store
                .append_reservation_history(r.id, "created", req.user_id, serde_json::json!({}))
                .await
                .map_err(ApiError::Internal)?;
            publish_created(bus, &r);
            Ok(r)
        }
    }
}

pub struct RecurrenceRuleSpec {
    pub frequency: String,
    pub interval: i32,
    pub days_of_week: Option<i16>,
    pub end_policy: String,
    pub end_date: Option<chrono::NaiveDate>,
    pub occurrence_count: Option<i32>,
}

pub struct RecurringCreateRequest {
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub rule: RecurrenceRuleSpec,
}

pub async fn create_recurring(
    store: &impl Store,
    bus: &Bus,
    cfg: &Config,
    req: RecurringCreateRequest,
) -> Result<Vec<Reservation>, ApiError> {
    validate_interval(req.start_time, req.end_time, &cfg.reservations)?;
    admission_check(store, cfg, req.resource_id, req.start_time, req.end_time).await?;

    let rule = RecurrenceRule {
        id: Uuid::new_v4(),
        frequency: req.rule.frequency,
        interval: req.rule.interval,
        days_of_week: req.rule.days_of_week,
        end_policy: req.rule.end_policy,
        end_date: req.rule.end_date,
        occurrence_count: req.rule.occurrence_count,
    };
    let occurrences = recurrence::expand(&rule, req.start_time, req.end_time, &cfg.reservations);
    if occurrences.is_empty() {
        return Err(ApiError::Validation("recurrence rule produced no occurrences".into()));
    }
    let with_ids: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)> =
        occurrences.into_iter().map(|(s, e)| (Uuid::new_v4(), s, e)).collect();

    match store
        .create_recurring_if_no_conflict(&rule, with_ids, req.user_id, req.resource_id)
        .await
        .map_err(ApiError::Internal)?
    {
        CreateManyOutcome::Conflict(conflicts) => {
            let ids = conflicts.iter().map(|r| r.id.to_string()).collect();
            Err(ApiError::Conflict("reservation_conflict".into(), ids))
        }
        CreateManyOutcome::Created(rows) => {
            for r in &rows {
                store
                    .append_reservation_history(r.id, "created", req.user_id, serde_json::json!({"recurring": true}))
                    .await
                    .map_err(ApiError::Internal)?;
                publish_created(bus, r);
            }
            Ok(rows)
        }
    }
}

pub async fn cancel(
    store: &impl Store,
    bus: &Bus,
    cfg: &Config,
    reservation_id: Uuid,
    actor_id: Uuid,
    privileged: bool,
    reason: Option<&str>,
) -> Result<Reservation, ApiError> {
    let existing = store
        .get_reservation(reservation_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("reservation not found".into()))?;

    // Cancellation is terminal: a reservation may only move active -> cancelled,
    // never cancelled/expired -> anything. Idempotent on an already-cancelled row.
    if existing.status == "cancelled" {
        return Ok(existing);
    }
    if existing.status != "active" {
        return Err(ApiError::Precondition("reservation is not active".into()));
    }
    // Owners may only cancel before the reservation starts; admins can cancel
    // any active reservation regardless of start time.
    if !privileged && existing.start_time <= Utc::now() {
        return Err(ApiError::Precondition("reservation has already started".into()));
    }

    let changed = store.cancel_reservation(reservation_id, reason).await.map_err(ApiError::Internal)?;
    let updated = store
        .get_reservation(reservation_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("reservation not found".into()))?;

    if changed {
        store
            .append_reservation_history(reservation_id, "cancelled", actor_id, serde_json::json!({ "reason": reason }))
            .await
            .map_err(ApiError::Internal)?;
        publish_cancelled(bus, &updated);
        crate::waitlist::promote_for_freed_interval(store, bus, cfg, updated.resource_id, updated.start_time, updated.end_time).await?;
    }
    Ok(updated)
}

/// The periodic expire sweep (§4.7): every active reservation whose
/// `end_time` has passed moves to `expired`. Cancelled reservations are
/// never touched here -- cancellation is terminal, not a precursor state
/// the sweep can overwrite.
pub async fn expire_sweep(store: &impl Store, bus: &Bus, cfg: &Config, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let expired = store.expire_due_reservations(now).await?;
    for r in &expired {
        store.append_reservation_history(r.id, "expired", Uuid::nil(), serde_json::json!({})).await?;
        let payload = serde_json::to_value(r).unwrap_or(serde_json::json!({}));
        bus.publish(Topic::Resource(r.resource_id), "reservation.expired", payload.clone());
        bus.publish(Topic::User(r.user_id), "reservation.expired", payload);
        crate::waitlist::promote_for_freed_interval(store, bus, cfg, r.resource_id, r.start_time, r.end_time)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_cfg() -> ReservationConfig {
        ReservationConfig {
            min_duration_minutes: 15,
            max_duration_minutes: 1440,
            grace_minutes: 0,
            daily_quota_per_user: 10,
            recurrence_horizon_days: 365,
            recurrence_max_occurrences: 500,
            expire_sweep_seconds: 60,
            enforce_business_hours: true,
        }
    }

    #[test]
    fn rejects_end_before_start() {
        let cfg = default_cfg();
        let start = Utc::now() + Duration::hours(1);
        let end = start - Duration::minutes(5);
        assert!(validate_interval(start, end, &cfg).is_err());
    }

    #[test]
    fn rejects_duration_below_minimum() {
        let cfg = default_cfg();
        let start = Utc::now() + Duration::hours(1);
        let end = start + Duration::minutes(5);
        assert!(validate_interval(start, end, &cfg).is_err());
    }

    #[test]
    fn accepts_well_formed_interval() {
        let cfg = default_cfg();
        let start = Utc::now() + Duration::hours(1);
        let end = start + Duration::minutes(30);
        assert!(validate_interval(start, end, &cfg).is_ok());
    }
}
