// This file contains all SQL statements issued by the reservation engine.
#![forbid(unsafe_code)]

// ========================= users =========================
pub const INSERT_USER: &str = concat!(
    "INSERT INTO users (id, username, password_hash, mfa_enabled, created_at, updated_at) ",
    "VALUES ($1, $2, $3, false, now(), now()) RETURNING id",
);

pub const SELECT_USER_BY_USERNAME: &str = "SELECT * FROM users WHERE username = $1";
pub const SELECT_USER_BY_ID: &str = "SELECT * FROM users WHERE id = $1";
pub const COUNT_USERS: &str = "SELECT count(*) FROM users";

pub const UPDATE_USER_PASSWORD: &str = concat!(
    "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
);

pub const UPDATE_USER_MFA: &str = concat!(
    "UPDATE users SET totp_secret = $2, mfa_enabled = $3, updated_at = now() WHERE id = $1",
);

// ========================= roles =========================
pub const INSERT_ROLE_ASSIGNMENT: &str = concat!(
    "INSERT INTO role_assignments (user_id, role) VALUES ($1, $2) ",
    "ON CONFLICT (user_id, role) DO NOTHING",
);

pub const SELECT_ROLES_FOR_USER: &str = "SELECT role FROM role_assignments WHERE user_id = $1";

// ========================= recovery codes =========================
pub const INSERT_RECOVERY_CODE: &str = concat!(
    "INSERT INTO recovery_codes (id, user_id, code_hash, used) VALUES ($1, $2, $3, false)",
);

pub const DELETE_RECOVERY_CODES_FOR_USER: &str = "DELETE FROM recovery_codes WHERE user_id = $1";

pub const SELECT_UNUSED_RECOVERY_CODES: &str =
    "SELECT * FROM recovery_codes WHERE user_id = $1 AND used = false";

pub const MARK_RECOVERY_CODE_USED: &str = "UPDATE recovery_codes SET used = true WHERE id = $1";

// ========================= refresh_tokens =========================
pub const INSERT_REFRESH_TOKEN: &str = concat!(
    "INSERT INTO refresh_tokens (id, user_id, token_hash, issued_at, expires_at, revoked) ",
    "VALUES ($1, $2, $3, now(), $4, false)",
);

pub const SELECT_REFRESH_TOKEN_BY_HASH_FOR_UPDATE: &str =
    "SELECT * FROM refresh_tokens WHERE token_hash = $1 FOR UPDATE";

pub const REVOKE_REFRESH_TOKEN: &str = "UPDATE refresh_tokens SET revoked = true WHERE id = $1";

pub const REVOKE_ALL_REFRESH_TOKENS_FOR_USER: &str =
    "UPDATE refresh_tokens SET revoked = true WHERE user_id = $1 AND revoked = false";

pub const DELETE_STALE_REFRESH_TOKENS: &str =
    "DELETE FROM refresh_tokens WHERE expires_at < $1";

// ========================= setup_state =========================
pub const SELECT_SETUP_STATE: &str = "SELECT * FROM setup_state WHERE singleton = true";

pub const UPDATE_SETUP_STATE: &str = concat!(
    "UPDATE setup_state SET setup_complete = $1, setup_reopened = $2, unlock_token_hash = $3 ",
    "WHERE singleton = true",
);

// ========================= resources =========================
pub const INSERT_RESOURCE: &str = concat!(
    "INSERT INTO resources (id, name, description, tags, base_available, status, created_at, updated_at) ",
    "VALUES ($1, $2, $3, $4, $5, 'available', now(), now()) RETURNING id",
);

pub const SELECT_RESOURCE_BY_ID: &str = "SELECT * FROM resources WHERE id = $1";
pub const SELECT_RESOURCE_BY_ID_FOR_UPDATE: &str = "SELECT * FROM resources WHERE id = $1 FOR UPDATE";
pub const SELECT_RESOURCE_BY_NAME: &str = "SELECT * FROM resources WHERE name = $1";
pub const LIST_RESOURCES: &str = "SELECT * FROM resources ORDER BY name ASC";

pub const UPDATE_RESOURCE_STATUS: &str = concat!(
    "UPDATE resources SET status = $2, unavailable_since = $3, updated_at = now() WHERE id = $1",
);

pub const LIST_RESOURCES_FOR_AUTO_RESET: &str = concat!(
    "SELECT * FROM resources WHERE status = 'unavailable' AND auto_reset_hours IS NOT NULL ",
    "AND unavailable_since IS NOT NULL ",
    "AND unavailable_since + (auto_reset_hours || ' hours')::interval <= $1",
);

pub const SELECT_RESOURCE_IDS_WITH_ACTIVE_RESERVATION_AT: &str = concat!(
    "SELECT DISTINCT resource_id FROM reservations WHERE status = 'active' ",
    "AND start_time <= $1 AND end_time > $1",
);

// ========================= business_hours =========================
pub const SELECT_BUSINESS_HOURS_FOR_RESOURCE: &str =
    "SELECT * FROM business_hours WHERE resource_id = $1 ORDER BY weekday ASC";

pub const SELECT_GLOBAL_BUSINESS_HOURS: &str =
    "SELECT * FROM business_hours WHERE resource_id IS NULL ORDER BY weekday ASC";

// ========================= blackout_dates =========================
pub const SELECT_BLACKOUTS_FOR_RESOURCE_IN_RANGE: &str = concat!(
    "SELECT * FROM blackout_dates WHERE (resource_id = $1 OR resource_id IS NULL) ",
    "AND date >= $2 AND date <= $3",
);

// ========================= reservations =========================
pub const INSERT_RESERVATION: &str = concat!(
    "INSERT INTO reservations ",
    "(id, user_id, resource_id, start_time, end_time, status, recurrence_rule_id, parent_reservation_id, created_at, updated_at) ",
    "VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, now(), now())",
);

pub const SELECT_CONFLICTING_ACTIVE_RESERVATIONS: &str = concat!(
    "SELECT * FROM reservations WHERE resource_id = $1 AND status = 'active' ",
    "AND start_time < $3 AND end_time > $2",
);

pub const SELECT_RESERVATION_BY_ID: &str = "SELECT * FROM reservations WHERE id = $1";
pub const SELECT_RESERVATION_BY_ID_FOR_UPDATE: &str =
    "SELECT * FROM reservations WHERE id = $1 FOR UPDATE";

pub const SELECT_ACTIVE_RESERVATIONS_FOR_RESOURCE_IN_RANGE: &str = concat!(
    "SELECT * FROM reservations WHERE resource_id = $1 AND status = 'active' ",
    "AND start_time < $3 AND end_time > $2 ORDER BY start_time ASC",
);

pub const SELECT_RESERVATIONS_FOR_USER: &str = concat!(
    "SELECT * FROM reservations WHERE user_id = $1 ORDER BY start_time DESC LIMIT $2 OFFSET $3",
);

pub const COUNT_USER_RESERVATIONS_ON_DAY: &str = concat!(
    "SELECT count(*) FROM reservations WHERE user_id = $1 AND status = 'active' ",
    "AND start_time >= $2 AND start_time < $3",
);

pub const CANCEL_RESERVATION: &str = concat!(
    "UPDATE reservations SET status = 'cancelled', cancelled_at = now(), ",
    "cancellation_reason = $2, updated_at = now() WHERE id = $1",
);

pub const EXPIRE_DUE_RESERVATIONS: &str = concat!(
    "UPDATE reservations SET status = 'expired', updated_at = now() ",
    "WHERE status = 'active' AND end_time <= $1 RETURNING *",
);

pub const INSERT_RESERVATION_HISTORY: &str = concat!(
    "INSERT INTO reservation_history (id, reservation_id, action, actor, details, created_at) ",
    "VALUES ($1, $2, $3, $4, $5, now())",
);

pub const SELECT_RESERVATION_HISTORY: &str = concat!(
    "SELECT * FROM reservation_history WHERE reservation_id = $1 ORDER BY created_at ASC",
);

pub const INSERT_RECURRENCE_RULE: &str = concat!(
    "INSERT INTO recurrence_rules (id, frequency, interval, days_of_week, end_policy, end_date, occurrence_count) ",
    "VALUES ($1, $2, $3, $4, $5, $6, $7)",
);

// ========================= waitlist_entries =========================
pub const INSERT_WAITLIST_ENTRY: &str = concat!(
    "INSERT INTO waitlist_entries ",
    "(id, user_id, resource_id, desired_start, desired_end, flexible_time, position, state, created_at) ",
    "VALUES ($1, $2, $3, $4, $5, $6, $7, 'waiting', now())",
);

pub const SELECT_NEXT_WAITLIST_POSITION: &str =
    "SELECT coalesce(max(position), 0) + 1 FROM waitlist_entries WHERE resource_id = $1";

pub const SELECT_WAITING_ENTRIES_FOR_RESOURCE: &str = concat!(
    "SELECT * FROM waitlist_entries WHERE resource_id = $1 AND state = 'waiting' ",
    "ORDER BY position ASC",
);

pub const SELECT_WAITLIST_ENTRY_BY_ID_FOR_UPDATE: &str =
    "SELECT * FROM waitlist_entries WHERE id = $1 FOR UPDATE";

pub const SELECT_WAITLIST_FOR_USER: &str =
    "SELECT * FROM waitlist_entries WHERE user_id = $1 ORDER BY created_at DESC";

pub const UPDATE_WAITLIST_ENTRY_STATE: &str = concat!(
    "UPDATE waitlist_entries SET state = $2, offer_expires_at = $3, offer_start = $4, offer_end = $5 ",
    "WHERE id = $1",
);

pub const SELECT_EXPIRED_OFFERS: &str = concat!(
    "SELECT * FROM waitlist_entries WHERE state = 'offered' AND offer_expires_at <= $1",
);

// ========================= notifications =========================
pub const INSERT_NOTIFICATION: &str = concat!(
    "INSERT INTO notifications (id, user_id, kind, message, read, link, created_at) ",
    "VALUES ($1, $2, $3, $4, false, $5, now())",
);

pub const SELECT_NOTIFICATIONS_FOR_USER: &str =
    "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3";

pub const MARK_NOTIFICATION_READ: &str =
    "UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2";

pub const MARK_ALL_NOTIFICATIONS_READ: &str =
    "UPDATE notifications SET read = true WHERE user_id = $1 AND read = false";

// ========================= webhooks =========================
pub const INSERT_WEBHOOK: &str = concat!(
    "INSERT INTO webhooks (id, url, event_filter, secret, active, consecutive_final_failures, created_at) ",
    "VALUES ($1, $2, $3, $4, true, 0, now())",
);

pub const SELECT_ACTIVE_WEBHOOKS_FOR_EVENT: &str = concat!(
    "SELECT * FROM webhooks WHERE active = true AND $1 = ANY(event_filter)",
);

pub const SELECT_WEBHOOK_BY_ID: &str = "SELECT * FROM webhooks WHERE id = $1";
pub const LIST_WEBHOOKS: &str = "SELECT * FROM webhooks ORDER BY created_at ASC";

pub const UPDATE_WEBHOOK_ACTIVE: &str = "UPDATE webhooks SET active = $2 WHERE id = $1";

pub const UPDATE_WEBHOOK_FAILURE_STREAK: &str =
    "UPDATE webhooks SET consecutive_final_failures = $2 WHERE id = $1";

pub const DELETE_WEBHOOK: &str = "DELETE FROM webhooks WHERE id = $1";

pub const INSERT_WEBHOOK_DELIVERY: &str = concat!(
    "INSERT INTO webhook_deliveries (id, webhook_id, event_type, payload, attempt_count, delivered, created_at) ",
    "VALUES ($1, $2, $3, $4, 0, false, now())",
);

pub const UPDATE_WEBHOOK_DELIVERY_ATTEMPT: &str = concat!(
    "UPDATE webhook_deliveries SET attempt_count = $2, next_retry_at = $3, status_code = $4, ",
    "response_snippet = $5, delivered = $6 WHERE id = $1",
);

pub const RESET_WEBHOOK_DELIVERY_ATTEMPT_COUNT: &str = concat!(
    "UPDATE webhook_deliveries SET attempt_count = 0, next_retry_at = now(), delivered = false WHERE id = $1",
);

pub const SELECT_DELIVERIES_DUE: &str = concat!(
    "SELECT * FROM webhook_deliveries WHERE delivered = false AND attempt_count < $1 ",
    "AND (next_retry_at IS NULL OR next_retry_at <= $2)",
);

pub const SELECT_DELIVERIES_FOR_WEBHOOK: &str =
    "SELECT * FROM webhook_deliveries WHERE webhook_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3";

pub const SELECT_DELIVERY_BY_ID: &str =
    "SELECT * FROM webhook_deliveries WHERE id = $1 AND webhook_id = $2";

// ========================= audit history =========================
pub const INSERT_AUDIT_HISTORY: &str = concat!(
    "INSERT INTO audit_history (id, entity_type, entity_id, action, actor, details, created_at) ",
    "VALUES ($1, $2, $3, $4, $5, $6, now())",
);
