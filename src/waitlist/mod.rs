#![forbid(unsafe_code)]

//! Waitlist join/offer/accept/leave and the promotion algorithm (§4.3).
//! Promotion runs FIFO by `position`: the first entry whose desired window
//! intersects the freed interval (or, for a flexible entry, whose desired
//! duration fits inside it) gets exactly one offer per freed interval.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::events::{Bus, Topic};
use crate::reservations;
use crate::utils::api_error::ApiError;
use crate::utils::config::Config;
use crate::utils::db::Store;
use crate::utils::db_types::{Reservation, WaitlistEntry, WaitlistEntryInput};

pub async fn join(
    store: &impl Store,
    bus: &Bus,
    user_id: Uuid,
    resource_id: Uuid,
    desired_start: DateTime<Utc>,
    desired_end: DateTime<Utc>,
    flexible_time: bool,
) -> Result<WaitlistEntry, ApiError> {
    if desired_start >= desired_end {
        return Err(ApiError::Validation("desired_start must be before desired_end".into()));
    }
    store.get_resource(resource_id).await.map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("resource not found".into()))?;

    let entry = store
        .join_waitlist(WaitlistEntryInput { user_id, resource_id, desired_start, desired_end, flexible_time })
        .await
        .map_err(ApiError::Internal)?;
    bus.publish(Topic::User(user_id), "waitlist.joined", serde_json::to_value(&entry).unwrap_or(serde_json::json!({})));
    Ok(entry)
}

fn matches(entry: &WaitlistEntry, freed_start: DateTime<Utc>, freed_end: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if entry.flexible_time {
        let duration = entry.desired_end - entry.desired_start;
        if freed_end - freed_start >= duration {
            return Some((freed_start, freed_start + duration));
        }
        None
    } else if entry.desired_start < freed_end && entry.desired_end > freed_start {
        Some((entry.desired_start, entry.desired_end))
    } else {
        None
    }
}

/// Called whenever a reservation frees an interval (cancel or expire).
/// Offers exactly one entry, if any matches; re-promotion after an offer
/// lapses always restarts the scan from position 1.
pub async fn promote_for_freed_interval(
    store: &impl Store,
    bus: &Bus,
    cfg: &Config,
    resource_id: Uuid,
    freed_start: DateTime<Utc>,
    freed_end: DateTime<Utc>,
) -> Result<Option<WaitlistEntry>, ApiError> {
    let waiting = store.waiting_entries_for_resource(resource_id).await.map_err(ApiError::Internal)?;
    for entry in waiting {
        if let Some((offer_start, offer_end)) = matches(&entry, freed_start, freed_end) {
            let expires_at = Utc::now() + Duration::minutes(cfg.waitlist.offer_ttl_minutes);
            store
                .update_waitlist_state(entry.id, "offered", Some(expires_at), Some(offer_start), Some(offer_end))
                .await
                .map_err(ApiError::Internal)?;
            store
                .insert_notification(
                    entry.user_id,
                    "waitlist_offer",
                    "A reservation slot has opened up for your waitlist request.",
                    None,
                )
                .await
                .map_err(ApiError::Internal)?;
            bus.publish(
                Topic::User(entry.user_id),
                "waitlist.offered",
                serde_json::json!({ "waitlist_entry_id": entry.id, "offer_start": offer_start, "offer_end": offer_end, "offer_expires_at": expires_at }),
            );
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

pub async fn accept(
    store: &impl Store,
    bus: &Bus,
    cfg: &Config,
    entry_id: Uuid,
    user_id: Uuid,
) -> Result<Reservation, ApiError> {
    let entry = store
        .get_waitlist_entry_for_update(entry_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("waitlist entry not found".into()))?;

    if entry.user_id != user_id {
        return Err(ApiError::Forbidden("waitlist entry belongs to another user".into()));
    }
    if entry.state != "offered" {
        return Err(ApiError::Precondition("waitlist entry has no active offer".into()));
    }
    let Some(expires_at) = entry.offer_expires_at else {
        return Err(ApiError::Precondition("waitlist entry has no active offer".into()));
    };
    if Utc::now() > expires_at {
        store.update_waitlist_state(entry.id, "expired", None, None, None).await.map_err(ApiError::Internal)?;
        return Err(ApiError::Precondition("offer has expired".into()));
    }
    let (start, end) = (
        entry.offer_start.unwrap_or(entry.desired_start),
        entry.offer_end.unwrap_or(entry.desired_end),
    );

    let reservation = reservations::create(
        store,
        bus,
        cfg,
        reservations::CreateRequest { user_id, resource_id: entry.resource_id, start_time: start, end_time: end },
    )
    .await?;

    store
        .update_waitlist_state(entry.id, "accepted", None, Some(start), Some(end))
        .await
        .map_err(ApiError::Internal)?;
    bus.publish(Topic::User(user_id), "waitlist.accepted", serde_json::json!({ "waitlist_entry_id": entry.id }));
    Ok(reservation)
}

pub async fn leave(store: &impl Store, entry_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
    let entry = store
        .get_waitlist_entry_for_update(entry_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("waitlist entry not found".into()))?;
    if entry.user_id != user_id {
        return Err(ApiError::Forbidden("waitlist entry belongs to another user".into()));
    }
    if entry.state != "waiting" && entry.state != "offered" {
        return Ok(());
    }
    store.update_waitlist_state(entry.id, "left", None, None, None).await.map_err(ApiError::Internal)?;
    Ok(())
}

/// Periodic sweep (§4.7): offers past `offer_expires_at` move to `expired`
/// and the resource's waitlist is re-scanned from position 1, since the
/// freed interval is still unclaimed.
pub async fn offer_expire_sweep(store: &impl Store, bus: &Bus, cfg: &Config, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let expired = store.expired_offers(now).await?;
    for entry in &expired {
        store.update_waitlist_state(entry.id, "expired", None, None, None).await?;
        bus.publish(Topic::User(entry.user_id), "waitlist.offer_expired", serde_json::json!({ "waitlist_entry_id": entry.id }));
        if let (Some(start), Some(end)) = (entry.offer_start, entry.offer_end) {
            promote_for_freed_interval(store, bus, cfg, entry.resource_id, start, end).await.map_err(|e| anyhow::anyhow!(e))?;
        }
    }
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(flexible: bool, start: DateTime<Utc>, end: DateTime<Utc>) -> WaitlistEntry {
        WaitlistEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            desired_start: start,
            desired_end: end,
            flexible_time: flexible,
            position: 1,
            state: "waiting".into(),
            offer_expires_at: None,
            offer_start: None,
            offer_end: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fixed_time_entry_requires_overlap() {
        let now = Utc::now();
        let e = entry(false, now, now + Duration::hours(1));
        assert!(matches(&e, now + Duration::hours(2), now + Duration::hours(3)).is_none());
        assert!(matches(&e, now, now + Duration::hours(1)).is_some());
    }

    #[test]
    fn flexible_entry_matches_any_sufficiently_long_freed_window() {
        let now = Utc::now();
        let e = entry(true, now, now + Duration::minutes(30));
        let offer = matches(&e, now + Duration::hours(5), now + Duration::hours(6)).unwrap();
        assert_eq!(offer.1 - offer.0, Duration::minutes(30));
    }
}
