#![forbid(unsafe_code)]

//! Availability projection (§4.4): composes business hours, blackout
//! dates, resource status and active reservations into free/busy windows.
//! Read-only -- every function here only queries `Store`, never mutates,
//! which is what lets `create` (§reservations) make a successful insert
//! immediately visible to the next `available_slots` call: both read the
//! same committed row, there's no separate projection cache to invalidate.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::utils::api_error::ApiError;
use crate::utils::db::Store;
use crate::utils::db_types::{BlackoutDate, BusinessHours, Reservation};

#[derive(Debug, Clone, Serialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn day_open_window(hours: &[BusinessHours], blackouts: &[BlackoutDate], date: NaiveDate) -> Option<(i32, i32)> {
    if blackouts.iter().any(|b| b.date == date) {
        return None;
    }
    if hours.is_empty() {
        return Some((0, 24 * 60));
    }
    let weekday = date.weekday().num_days_from_sunday() as i16;
    match hours.iter().find(|h| h.weekday == weekday) {
        Some(h) if !h.closed => Some((h.open_minute, h.close_minute)),
        _ => None,
    }
}

fn free_slots_for_day(date: NaiveDate, window: (i32, i32), reservations: &[Reservation]) -> Vec<TimeSlot> {
    let day_start = date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
    let open_start = day_start + Duration::minutes(window.0 as i64);
    let open_end = day_start + Duration::minutes(window.1 as i64);

    let mut busy: Vec<(DateTime<Utc>, DateTime<Utc>)> = reservations
        .iter()
        .filter(|r| r.start_time < open_end && r.end_time > open_start)
        .map(|r| (r.start_time.max(open_start), r.end_time.min(open_end)))
        .collect();
    busy.sort_by_key(|b| b.0);

    let mut slots = Vec::new();
    let mut cursor = open_start;
    for (s, e) in busy {
        if s > cursor {
            slots.push(TimeSlot { start: cursor, end: s });
        }
        if e > cursor {
            cursor = e;
        }
    }
    if cursor < open_end {
        slots.push(TimeSlot { start: cursor, end: open_end });
    }
    slots
}

async fn resource_hours(store: &impl Store, resource_id: Uuid) -> Result<Vec<BusinessHours>, ApiError> {
    let hours = store.business_hours_for_resource(resource_id).await.map_err(ApiError::Internal)?;
    if !hours.is_empty() {
        return Ok(hours);
    }
    store.global_business_hours().await.map_err(ApiError::Internal)
}

/// Why a segment of a `schedule()` is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Reserved,
    Closed,
    Blackout,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
    pub reason: Option<UnavailableReason>,
}

/// Composes resource status, business hours, blackout dates and active
/// reservations into an ordered list of `[start, end, available, reason?]`
/// segments covering `[from, to)`, snapped to `granularity_minutes`
/// boundaries and merged where adjacent segments share the same verdict.
pub async fn schedule(
    store: &impl Store,
    resource_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    granularity_minutes: i64,
) -> Result<Vec<ScheduleSegment>, ApiError> {
    let resource = store.get_resource(resource_id).await.map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("resource not found".into()))?;
    let disabled = resource.status == "unavailable" || !resource.base_available;

    let hours = resource_hours(store, resource_id).await?;
    let blackouts = store
        .blackouts_in_range(resource_id, from.date_naive(), to.date_naive())
        .await
        .map_err(ApiError::Internal)?;
    let reservations = store.active_reservations_in_range(resource_id, from, to).await.map_err(ApiError::Internal)?;

    let step = Duration::minutes(granularity_minutes.max(1));
    let mut segments: Vec<ScheduleSegment> = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let seg_end = (cursor + step).min(to);
        let (available, reason) = if disabled {
            (false, Some(UnavailableReason::Disabled))
        } else if reservations.iter().any(|r| r.start_time < seg_end && r.end_time > cursor) {
            (false, Some(UnavailableReason::Reserved))
        } else {
            let date = cursor.date_naive();
            match day_open_window(&hours, &blackouts, date) {
                None if blackouts.iter().any(|b| b.date == date) => (false, Some(UnavailableReason::Blackout)),
                None => (false, Some(UnavailableReason::Closed)),
                Some((open_m, close_m)) => {
                    let day_start = date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
                    let open_start = day_start + Duration::minutes(open_m as i64);
                    let open_end = day_start + Duration::minutes(close_m as i64);
                    if cursor >= open_start && seg_end <= open_end {
                        (true, None)
                    } else {
                        (false, Some(UnavailableReason::Closed))
                    }
                }
            }
        };

        match segments.last_mut() {
            Some(prev) if prev.end == cursor && prev.available == available && prev.reason == reason => {
                prev.end = seg_end;
            }
            _ => segments.push(ScheduleSegment { start: cursor, end: seg_end, available, reason }),
        }
        cursor = seg_end;
    }
    Ok(segments)
}

pub async fn available_slots(
    store: &impl Store,
    resource_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TimeSlot>, ApiError> {
    let resource = store.get_resource(resource_id).await.map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("resource not found".into()))?;
    if !resource.base_available {
        return Ok(vec![]);
    }

    let hours = resource_hours(store, resource_id).await?;
    let blackouts = store
        .blackouts_in_range(resource_id, from.date_naive(), to.date_naive())
        .await
        .map_err(ApiError::Internal)?;
    let reservations = store.active_reservations_in_range(resource_id, from, to).await.map_err(ApiError::Internal)?;

    let mut slots = Vec::new();
    let mut date = from.date_naive();
    let end_date = to.date_naive();
    while date <= end_date {
        if let Some(window) = day_open_window(&hours, &blackouts, date) {
            for slot in free_slots_for_day(date, window, &reservations) {
                if slot.end > from && slot.start < to {
                    slots.push(TimeSlot { start: slot.start.max(from), end: slot.end.min(to) });
                }
            }
        }
        date = date.succ_opt().expect("date does not overflow within a bounded query window");
    }
    Ok(slots)
}

/// First free window on or after `after` long enough for `duration_minutes`,
/// searched up to a 30-day horizon.
pub async fn next_available(
    store: &impl Store,
    resource_id: Uuid,
    after: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<Option<TimeSlot>, ApiError> {
    let horizon = after + Duration::days(30);
    let slots = available_slots(store, resource_id, after, horizon).await?;
    Ok(slots.into_iter().find(|s| (s.end - s.start).num_minutes() >= duration_minutes))
}

/// Per-resource utilization over a window -- not a §4.3 query, but a useful
/// reporting figure built from the same pieces, kept distinct from the
/// global `summary()` below.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUtilization {
    pub resource_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub open_minutes: i64,
    pub reserved_minutes: i64,
    pub utilization_pct: f64,
}

pub async fn utilization(
    store: &impl Store,
    resource_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<ResourceUtilization, ApiError> {
    store.get_resource(resource_id).await.map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("resource not found".into()))?;

    let hours = resource_hours(store, resource_id).await?;
    let blackouts = store
        .blackouts_in_range(resource_id, from.date_naive(), to.date_naive())
        .await
        .map_err(ApiError::Internal)?;
    let reservations = store.active_reservations_in_range(resource_id, from, to).await.map_err(ApiError::Internal)?;

    let mut open_minutes = 0i64;
    let mut date = from.date_naive();
    let end_date = to.date_naive();
    while date <= end_date {
        if let Some((open_m, close_m)) = day_open_window(&hours, &blackouts, date) {
            open_minutes += (close_m - open_m) as i64;
        }
        date = date.succ_opt().expect("date does not overflow within a bounded query window");
    }

    let reserved_minutes: i64 = reservations
        .iter()
        .map(|r| (r.end_time.min(to) - r.start_time.max(from)).num_minutes().max(0))
        .sum();

    let utilization_pct = if open_minutes > 0 { reserved_minutes as f64 / open_minutes as f64 * 100.0 } else { 0.0 };

    Ok(ResourceUtilization { resource_id, window_start: from, window_end: to, open_minutes, reserved_minutes, utilization_pct })
}

/// §4.3 `summary()`: global counts across every resource, as of now.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilitySummary {
    pub available_now: i64,
    pub currently_reserved: i64,
    pub administratively_unavailable: i64,
}

pub async fn summary(store: &impl Store) -> Result<AvailabilitySummary, ApiError> {
    let resources = store.list_resources().await.map_err(ApiError::Internal)?;
    let mut summary = AvailabilitySummary { available_now: 0, currently_reserved: 0, administratively_unavailable: 0 };
    for r in &resources {
        match r.status.as_str() {
            "in_use" => summary.currently_reserved += 1,
            "unavailable" => summary.administratively_unavailable += 1,
            _ => summary.available_now += 1,
        }
    }
    Ok(summary)
}

/// Keeps the §3 invariant `status=in_use iff an active reservation covers
/// now()` true. Resources an admin has marked `unavailable` are left alone
/// -- that's an administrative hold, not something a reservation should
/// silently override.
pub async fn sync_resource_status(store: &impl Store, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let reserved: HashSet<Uuid> = store.resource_ids_with_active_reservation_at(now).await?.into_iter().collect();
    let resources = store.list_resources().await?;
    let mut changed = 0;
    for r in resources {
        if r.status == "unavailable" {
            continue;
        }
        let target = if reserved.contains(&r.id) { "in_use" } else { "available" };
        if r.status != target {
            store.update_resource_status(r.id, target, None).await?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours_open_all_day(weekday: i16) -> BusinessHours {
        BusinessHours { id: Uuid::new_v4(), resource_id: None, weekday, open_minute: 0, close_minute: 24 * 60, closed: false }
    }

    #[test]
    fn day_open_window_respects_blackout() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let hours = vec![hours_open_all_day(date.weekday().num_days_from_sunday() as i16)];
        let blackout = BlackoutDate { id: Uuid::new_v4(), resource_id: None, date, reason: "holiday".into() };
        assert_eq!(day_open_window(&hours, &[blackout], date), None);
    }

    #[test]
    fn free_slots_exclude_reservations() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            start_time: day_start + Duration::hours(9),
            end_time: day_start + Duration::hours(10),
            status: "active".into(),
            recurrence_rule_id: None,
            parent_reservation_id: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let slots = free_slots_for_day(date, (8 * 60, 12 * 60), &[reservation]);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].end, day_start + Duration::hours(9));
        assert_eq!(slots[1].start, day_start + Duration::hours(10));
    }
}
