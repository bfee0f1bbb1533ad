// This file contains the reservation engine's database row structs and
// their corresponding insert-input structs, one pair per table, in the
// style used throughout this codebase: plain records, never an ORM
// object graph, with related entities referenced by id and resolved on
// demand by the service layer that needs them.
#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// users / roles:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub totp_secret: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserInput {
    pub username: String,
    pub password_hash: String,
}

impl UserInput {
    pub fn new(username: String, password_hash: String) -> Self {
        Self { username, password_hash }
    }
}

/// A role assignment. Roles are a static seeded set (`admin`, `user`,
/// `guest`); this row is the many-to-many edge between a user and one.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecoveryCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used: bool,
}

// ---------------------------------------------------------------------------
// refresh_tokens:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenInput {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenInput {
    pub fn new(id: Uuid, user_id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self { id, user_id, token_hash, expires_at }
    }
}

// ---------------------------------------------------------------------------
// setup_state:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SetupState {
    pub singleton: bool,
    pub setup_complete: bool,
    pub setup_reopened: bool,
    pub unlock_token_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// resources:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub base_available: bool,
    pub status: String, // "available" | "in_use" | "unavailable"
    pub auto_reset_hours: Option<i32>,
    pub unavailable_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResourceInput {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub base_available: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BusinessHours {
    pub id: Uuid,
    pub resource_id: Option<Uuid>, // None => global default row
    pub weekday: i16,              // 0 = Sunday .. 6 = Saturday
    pub open_minute: i32,          // minutes since midnight
    pub close_minute: i32,
    pub closed: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlackoutDate {
    pub id: Uuid,
    pub resource_id: Option<Uuid>, // None => applies to every resource
    pub date: chrono::NaiveDate,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// reservations:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String, // "active" | "cancelled" | "expired"
    pub recurrence_rule_id: Option<Uuid>,
    pub parent_reservation_id: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReservationInput {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub recurrence_rule_id: Option<Uuid>,
    pub parent_reservation_id: Option<Uuid>,
}

impl ReservationInput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        user_id: Uuid,
        resource_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        recurrence_rule_id: Option<Uuid>,
        parent_reservation_id: Option<Uuid>,
    ) -> Self {
        Self { id, user_id, resource_id, start_time, end_time, recurrence_rule_id, parent_reservation_id }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: Uuid,
    pub frequency: String, // "daily" | "weekly" | "monthly"
    pub interval: i32,
    pub days_of_week: Option<i16>, // bitmap, bit 0 = Sunday
    pub end_policy: String,        // "never" | "on_date" | "after_count"
    pub end_date: Option<chrono::NaiveDate>,
    pub occurrence_count: Option<i32>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReservationHistoryEntry {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub action: String,
    pub actor: Uuid,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// waitlist:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub desired_start: DateTime<Utc>,
    pub desired_end: DateTime<Utc>,
    pub flexible_time: bool,
    pub position: i64,
    pub state: String, // "waiting" | "offered" | "accepted" | "expired" | "left"
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// The concrete window offered to this entry -- equal to
    /// `(desired_start, desired_end)` for a fixed-time match, or the
    /// matching sub-window of the freed interval for a flexible one.
    pub offer_start: Option<DateTime<Utc>>,
    pub offer_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WaitlistEntryInput {
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub desired_start: DateTime<Utc>,
    pub desired_end: DateTime<Utc>,
    pub flexible_time: bool,
}

// ---------------------------------------------------------------------------
// notifications:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// webhooks:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub url: String,
    pub event_filter: Vec<String>,
    pub secret: String,
    pub active: bool,
    pub consecutive_final_failures: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub status_code: Option<i32>,
    pub response_snippet: Option<String>,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// audit history (generic, entity-agnostic):
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditHistoryEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub actor: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
