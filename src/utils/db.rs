#![forbid(unsafe_code)]

//! The storage abstraction: a small set of transactional operations the
//! core talks to storage through. `Store` is a plain trait (no `dyn`,
//! matching the teacher's choice of a concrete connection/pool type over
//! dynamic dispatch) so engine code can be written once against it and
//! exercised in tests against an in-memory fake without a live database.
//!
//! `PgStore` is the only production implementation, backed by `sqlx`
//! against Postgres. The two compound operations the engine's correctness
//! leans on -- `create_reservation_if_no_conflict` and
//! `rotate_refresh_token` -- each run inside a single transaction using
//! `SELECT ... FOR UPDATE` as the serialization key, the same "begin tx,
//! query, mutate, commit" shape every handler in this codebase uses.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::utils::db_statements::*;
use crate::utils::db_types::*;

/// Outcome of a conflict-checked reservation insert.
pub enum CreateOutcome {
    Created(Reservation),
    Conflict(Vec<Reservation>),
}

/// Outcome of a refresh-token rotation attempt.
pub enum RotateOutcome {
    Rotated(RefreshToken),
    StaleOrUnknown,
}

/// Outcome of an all-or-nothing recurring reservation insert: either every
/// occurrence landed, or the first conflicting occurrence's overlapping
/// rows are returned and the whole batch is rolled back.
pub enum CreateManyOutcome {
    Created(Vec<Reservation>),
    Conflict(Vec<Reservation>),
}

pub trait Store: Send + Sync {
    // ----------------------------- users -----------------------------
    async fn insert_user(&self, input: UserInput) -> Result<User>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn count_users(&self) -> Result<i64>;
    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> Result<()>;
    async fn update_user_mfa(&self, id: Uuid, secret: Option<&str>, enabled: bool) -> Result<()>;
    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()>;
    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<String>>;
    async fn replace_recovery_codes(&self, user_id: Uuid, hashes: &[String]) -> Result<()>;
    async fn consume_recovery_code(&self, user_id: Uuid, candidate_hash: &str) -> Result<bool>;

    // ------------------------- refresh tokens -------------------------
    async fn insert_refresh_token(&self, input: RefreshTokenInput) -> Result<()>;
    /// Atomically revoke the token hashing to `old_hash` and insert a
    /// fresh one for the same user. The new row's `user_id` is derived
    /// from the looked-up old row, not supplied by the caller, since the
    /// caller only has the opaque old token in hand.
    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_id: Uuid,
        new_token_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome>;
    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64>;
    async fn sweep_stale_refresh_tokens(&self, before: DateTime<Utc>) -> Result<u64>;

    // ---------------------------- setup gate ----------------------------
    async fn get_setup_state(&self) -> Result<SetupState>;
    async fn update_setup_state(&self, s: &SetupState) -> Result<()>;

    // ----------------------------- resources -----------------------------
    async fn insert_resource(&self, input: ResourceInput) -> Result<Resource>;
    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>>;
    async fn get_resource_by_name(&self, name: &str) -> Result<Option<Resource>>;
    async fn list_resources(&self) -> Result<Vec<Resource>>;
    async fn update_resource_status(
        &self,
        id: Uuid,
        status: &str,
        unavailable_since: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn resources_due_for_auto_reset(&self, now: DateTime<Utc>) -> Result<Vec<Resource>>;
    /// Resource ids with an active reservation covering `now`, the set that
    /// must carry `status = "in_use"` per the §3 invariant.
    async fn resource_ids_with_active_reservation_at(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>>;
    async fn business_hours_for_resource(&self, id: Uuid) -> Result<Vec<BusinessHours>>;
    async fn global_business_hours(&self) -> Result<Vec<BusinessHours>>;
    async fn blackouts_in_range(
        &self,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BlackoutDate>>;

    // ---------------------------- reservations ----------------------------
    async fn create_reservation_if_no_conflict(&self, input: ReservationInput) -> Result<CreateOutcome>;
    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>>;
    async fn active_reservations_in_range(
        &self,
        resource_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>>;
    async fn reservations_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Reservation>>;
    async fn count_user_reservations_on_day(
        &self,
        user_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<i64>;
    async fn cancel_reservation(&self, id: Uuid, reason: Option<&str>) -> Result<bool>;
    async fn expire_due_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;
    async fn append_reservation_history(
        &self,
        reservation_id: Uuid,
        action: &str,
        actor: Uuid,
        details: serde_json::Value,
    ) -> Result<()>;
    async fn reservation_history(&self, reservation_id: Uuid) -> Result<Vec<ReservationHistoryEntry>>;
    async fn insert_recurrence_rule(&self, rule: &RecurrenceRule) -> Result<()>;
    /// Inserts the rule row and every occurrence in one transaction,
    /// conflict-checking each occurrence in order against the same
    /// resource lock `create_reservation_if_no_conflict` takes. The first
    /// occurrence's id is used as `parent_reservation_id` for the rest.
    async fn create_recurring_if_no_conflict(
        &self,
        rule: &RecurrenceRule,
        occurrences: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)>,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> Result<CreateManyOutcome>;

    // ----------------------------- waitlist -----------------------------
    async fn join_waitlist(&self, input: WaitlistEntryInput) -> Result<WaitlistEntry>;
    async fn waiting_entries_for_resource(&self, resource_id: Uuid) -> Result<Vec<WaitlistEntry>>;
    async fn get_waitlist_entry_for_update(&self, id: Uuid) -> Result<Option<WaitlistEntry>>;
    #[allow(clippy::too_many_arguments)]
    async fn update_waitlist_state(
        &self,
        id: Uuid,
        state: &str,
        offer_expires_at: Option<DateTime<Utc>>,
        offer_start: Option<DateTime<Utc>>,
        offer_end: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn waitlist_for_user(&self, user_id: Uuid) -> Result<Vec<WaitlistEntry>>;
    async fn expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>>;

    // --------------------------- notifications ---------------------------
    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: &str,
        message: &str,
        link: Option<&str>,
    ) -> Result<()>;
    async fn notifications_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>>;
    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64>;

    // ----------------------------- webhooks -----------------------------
    async fn insert_webhook(&self, url: &str, filter: &[String], secret: &str) -> Result<Webhook>;
    async fn active_webhooks_for_event(&self, event: &str) -> Result<Vec<Webhook>>;
    async fn get_webhook(&self, id: Uuid) -> Result<Option<Webhook>>;
    async fn list_webhooks(&self) -> Result<Vec<Webhook>>;
    async fn set_webhook_active(&self, id: Uuid, active: bool) -> Result<()>;
    async fn set_webhook_failure_streak(&self, id: Uuid, streak: i32) -> Result<()>;
    async fn delete_webhook(&self, id: Uuid) -> Result<()>;
    async fn insert_webhook_delivery(
        &self,
        webhook_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<WebhookDelivery>;
    #[allow(clippy::too_many_arguments)]
    async fn update_webhook_delivery_attempt(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_retry_at: Option<DateTime<Utc>>,
        status_code: Option<i32>,
        response_snippet: Option<&str>,
        delivered: bool,
    ) -> Result<()>;
    async fn reset_webhook_delivery(&self, id: Uuid) -> Result<()>;
    async fn deliveries_due(&self, max_attempts: i32, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>>;
    async fn deliveries_for_webhook(
        &self,
        webhook_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>>;
    async fn get_delivery(&self, webhook_id: Uuid, delivery_id: Uuid) -> Result<Option<WebhookDelivery>>;

    // ------------------------------ audit ------------------------------
    async fn append_audit(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        action: &str,
        actor: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<()>;
}

// ***************************************************************************
//                              Postgres Store
// ***************************************************************************
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

impl Store for PgStore {
    async fn insert_user(&self, input: UserInput) -> Result<User> {
        let id = Uuid::new_v4();
        sqlx::query(INSERT_USER)
            .bind(id)
            .bind(&input.username)
            .bind(&input.password_hash)
            .execute(&self.pool)
            .await?;
        Ok(self.get_user_by_id(id).await?.expect("just inserted"))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(SELECT_USER_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(SELECT_USER_BY_ID).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn count_users(&self) -> Result<i64> {
        let row = sqlx::query(COUNT_USERS).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(UPDATE_USER_PASSWORD).bind(id).bind(password_hash).execute(&self.pool).await?;
        Ok(())
    }

    async fn update_user_mfa(&self, id: Uuid, secret: Option<&str>, enabled: bool) -> Result<()> {
        sqlx::query(UPDATE_USER_MFA).bind(id).bind(secret).bind(enabled).execute(&self.pool).await?;
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()> {
        sqlx::query(INSERT_ROLE_ASSIGNMENT).bind(user_id).bind(role).execute(&self.pool).await?;
        Ok(())
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query(SELECT_ROLES_FOR_USER).bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn replace_recovery_codes(&self, user_id: Uuid, hashes: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(DELETE_RECOVERY_CODES_FOR_USER).bind(user_id).execute(&mut *tx).await?;
        for hash in hashes {
            sqlx::query(INSERT_RECOVERY_CODE)
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(hash)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn consume_recovery_code(&self, user_id: Uuid, candidate_hash: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let codes = sqlx::query_as::<_, RecoveryCode>(SELECT_UNUSED_RECOVERY_CODES)
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;
        let found = codes.into_iter().find(|c| c.code_hash == candidate_hash);
        let consumed = if let Some(c) = found {
            sqlx::query(MARK_RECOVERY_CODE_USED).bind(c.id).execute(&mut *tx).await?;
            true
        } else {
            false
        };
        tx.commit().await?;
        Ok(consumed)
    }

    async fn insert_refresh_token(&self, input: RefreshTokenInput) -> Result<()> {
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(input.id)
            .bind(input.user_id)
            .bind(&input.token_hash)
            .bind(input.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_id: Uuid,
        new_token_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome> {
        let mut tx = self.pool.begin().await?;
        let old = sqlx::query_as::<_, RefreshToken>(SELECT_REFRESH_TOKEN_BY_HASH_FOR_UPDATE)
            .bind(old_hash)
            .fetch_optional(&mut *tx)
            .await?;

        let old = match old {
            Some(o) if !o.revoked && o.expires_at > Utc::now() => o,
            _ => {
                tx.commit().await?;
                return Ok(RotateOutcome::StaleOrUnknown);
            }
        };

        sqlx::query(REVOKE_REFRESH_TOKEN).bind(old.id).execute(&mut *tx).await?;
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(new_id)
            .bind(old.user_id)
            .bind(new_token_hash)
            .bind(new_expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RotateOutcome::Rotated(RefreshToken {
            id: new_id,
            user_id: old.user_id,
            token_hash: new_token_hash.to_string(),
            issued_at: Utc::now(),
            expires_at: new_expires_at,
            revoked: false,
        }))
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64> {
        let r = sqlx::query(REVOKE_ALL_REFRESH_TOKENS_FOR_USER).bind(user_id).execute(&self.pool).await?;
        Ok(r.rows_affected())
    }

    async fn sweep_stale_refresh_tokens(&self, before: DateTime<Utc>) -> Result<u64> {
        let r = sqlx::query(DELETE_STALE_REFRESH_TOKENS).bind(before).execute(&self.pool).await?;
        Ok(r.rows_affected())
    }

    async fn get_setup_state(&self) -> Result<SetupState> {
        Ok(sqlx::query_as::<_, SetupState>(SELECT_SETUP_STATE).fetch_one(&self.pool).await?)
    }

    async fn update_setup_state(&self, s: &SetupState) -> Result<()> {
        sqlx::query(UPDATE_SETUP_STATE)
            .bind(s.setup_complete)
            .bind(s.setup_reopened)
            .bind(&s.unlock_token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_resource(&self, input: ResourceInput) -> Result<Resource> {
        let id = Uuid::new_v4();
        sqlx::query(INSERT_RESOURCE)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.tags)
            .bind(input.base_available)
            .execute(&self.pool)
            .await?;
        Ok(self.get_resource(id).await?.expect("just inserted"))
    }

    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        Ok(sqlx::query_as::<_, Resource>(SELECT_RESOURCE_BY_ID).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn get_resource_by_name(&self, name: &str) -> Result<Option<Resource>> {
        Ok(sqlx::query_as::<_, Resource>(SELECT_RESOURCE_BY_NAME).bind(name).fetch_optional(&self.pool).await?)
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(sqlx::query_as::<_, Resource>(LIST_RESOURCES).fetch_all(&self.pool).await?)
    }

    async fn update_resource_status(
        &self,
        id: Uuid,
        status: &str,
        unavailable_since: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(UPDATE_RESOURCE_STATUS).bind(id).bind(status).bind(unavailable_since).execute(&self.pool).await?;
        Ok(())
    }

    async fn resources_due_for_auto_reset(&self, now: DateTime<Utc>) -> Result<Vec<Resource>> {
        Ok(sqlx::query_as::<_, Resource>(LIST_RESOURCES_FOR_AUTO_RESET).bind(now).fetch_all(&self.pool).await?)
    }

    async fn resource_ids_with_active_reservation_at(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(SELECT_RESOURCE_IDS_WITH_ACTIVE_RESERVATION_AT).bind(now).fetch_all(&self.pool).await?;
        rows.iter().map(|r| r.try_get::<Uuid, _>("resource_id").map_err(Into::into)).collect()
    }

    async fn business_hours_for_resource(&self, id: Uuid) -> Result<Vec<BusinessHours>> {
        Ok(sqlx::query_as::<_, BusinessHours>(SELECT_BUSINESS_HOURS_FOR_RESOURCE)
            .bind(id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn global_business_hours(&self) -> Result<Vec<BusinessHours>> {
        Ok(sqlx::query_as::<_, BusinessHours>(SELECT_GLOBAL_BUSINESS_HOURS).fetch_all(&self.pool).await?)
    }

    async fn blackouts_in_range(
        &self,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BlackoutDate>> {
        Ok(sqlx::query_as::<_, BlackoutDate>(SELECT_BLACKOUTS_FOR_RESOURCE_IN_RANGE)
            .bind(resource_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_reservation_if_no_conflict(&self, input: ReservationInput) -> Result<CreateOutcome> {
        let mut tx = self.pool.begin().await?;

        // Lock the resource row so concurrent creates on the same resource
        // serialize here rather than racing on the conflict check below.
        sqlx::query(SELECT_RESOURCE_BY_ID_FOR_UPDATE).bind(input.resource_id).fetch_optional(&mut *tx).await?;

        let conflicts = sqlx::query_as::<_, Reservation>(SELECT_CONFLICTING_ACTIVE_RESERVATIONS)
            .bind(input.resource_id)
            .bind(input.start_time)
            .bind(input.end_time)
            .fetch_all(&mut *tx)
            .await?;

        if !conflicts.is_empty() {
            tx.commit().await?;
            return Ok(CreateOutcome::Conflict(conflicts));
        }

        sqlx::query(INSERT_RESERVATION)
            .bind(input.id)
            .bind(input.user_id)
            .bind(input.resource_id)
            .bind(input.start_time)
            .bind(input.end_time)
            .bind(input.recurrence_rule_id)
            .bind(input.parent_reservation_id)
            .execute(&mut *tx)
            .await?;

        let row =
            sqlx::query_as::<_, Reservation>(SELECT_RESERVATION_BY_ID).bind(input.id).fetch_one(&mut *tx).await?;

        tx.commit().await?;
        Ok(CreateOutcome::Created(row))
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        Ok(sqlx::query_as::<_, Reservation>(SELECT_RESERVATION_BY_ID).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn active_reservations_in_range(
        &self,
        resource_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        Ok(sqlx::query_as::<_, Reservation>(SELECT_ACTIVE_RESERVATIONS_FOR_RESOURCE_IN_RANGE)
            .bind(resource_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn reservations_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Reservation>> {
        Ok(sqlx::query_as::<_, Reservation>(SELECT_RESERVATIONS_FOR_USER)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_user_reservations_on_day(
        &self,
        user_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(COUNT_USER_RESERVATIONS_ON_DAY)
            .bind(user_id)
            .bind(day_start)
            .bind(day_end)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn cancel_reservation(&self, id: Uuid, reason: Option<&str>) -> Result<bool> {
        let r = sqlx::query(CANCEL_RESERVATION).bind(id).bind(reason).execute(&self.pool).await?;
        Ok(r.rows_affected() > 0)
    }

    async fn expire_due_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        Ok(sqlx::query_as::<_, Reservation>(EXPIRE_DUE_RESERVATIONS).bind(now).fetch_all(&self.pool).await?)
    }

    async fn append_reservation_history(
        &self,
        reservation_id: Uuid,
        action: &str,
        actor: Uuid,
        details: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(INSERT_RESERVATION_HISTORY)
            .bind(Uuid::new_v4())
            .bind(reservation_id)
            .bind(action)
            .bind(actor)
            .bind(details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reservation_history(&self, reservation_id: Uuid) -> Result<Vec<ReservationHistoryEntry>> {
        Ok(sqlx::query_as::<_, ReservationHistoryEntry>(SELECT_RESERVATION_HISTORY)
            .bind(reservation_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_recurrence_rule(&self, rule: &RecurrenceRule) -> Result<()> {
        sqlx::query(INSERT_RECURRENCE_RULE)
            .bind(rule.id)
            .bind(&rule.frequency)
            .bind(rule.interval)
            .bind(rule.days_of_week)
            .bind(&rule.end_policy)
            .bind(rule.end_date)
            .bind(rule.occurrence_count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_recurring_if_no_conflict(
        &self,
        rule: &RecurrenceRule,
        occurrences: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)>,
        user_id: Uuid,
        resource_id: Uuid,
    ) -> Result<CreateManyOutcome> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(SELECT_RESOURCE_BY_ID_FOR_UPDATE).bind(resource_id).fetch_optional(&mut *tx).await?;
        sqlx::query(INSERT_RECURRENCE_RULE)
            .bind(rule.id)
            .bind(&rule.frequency)
            .bind(rule.interval)
            .bind(rule.days_of_week)
            .bind(&rule.end_policy)
            .bind(rule.end_date)
            .bind(rule.occurrence_count)
            .execute(&mut *tx)
            .await?;

        let mut parent_id: Option<Uuid> = None;
        let mut created = Vec::with_capacity(occurrences.len());
        for (id, start, end) in occurrences {
            let conflicts = sqlx::query_as::<_, Reservation>(SELECT_CONFLICTING_ACTIVE_RESERVATIONS)
                .bind(resource_id)
                .bind(start)
                .bind(end)
                .fetch_all(&mut *tx)
                .await?;
            if !conflicts.is_empty() {
                tx.rollback().await?;
                return Ok(CreateManyOutcome::Conflict(conflicts));
            }
            sqlx::query(INSERT_RESERVATION)
                .bind(id)
                .bind(user_id)
                .bind(resource_id)
                .bind(start)
                .bind(end)
                .bind(rule.id)
                .bind(parent_id)
                .execute(&mut *tx)
                .await?;
            let row =
                sqlx::query_as::<_, Reservation>(SELECT_RESERVATION_BY_ID).bind(id).fetch_one(&mut *tx).await?;
            if parent_id.is_none() {
                parent_id = Some(id);
            }
            created.push(row);
        }
        tx.commit().await?;
        Ok(CreateManyOutcome::Created(created))
    }

    async fn join_waitlist(&self, input: WaitlistEntryInput) -> Result<WaitlistEntry> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(SELECT_NEXT_WAITLIST_POSITION).bind(input.resource_id).fetch_one(&mut *tx).await?;
        let position: i64 = row.try_get(0)?;
        let id = Uuid::new_v4();
        sqlx::query(INSERT_WAITLIST_ENTRY)
            .bind(id)
            .bind(input.user_id)
            .bind(input.resource_id)
            .bind(input.desired_start)
            .bind(input.desired_end)
            .bind(input.flexible_time)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        let entry = sqlx::query_as::<_, WaitlistEntry>("SELECT * FROM waitlist_entries WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn waiting_entries_for_resource(&self, resource_id: Uuid) -> Result<Vec<WaitlistEntry>> {
        Ok(sqlx::query_as::<_, WaitlistEntry>(SELECT_WAITING_ENTRIES_FOR_RESOURCE)
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_waitlist_entry_for_update(&self, id: Uuid) -> Result<Option<WaitlistEntry>> {
        Ok(sqlx::query_as::<_, WaitlistEntry>(SELECT_WAITLIST_ENTRY_BY_ID_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_waitlist_state(
        &self,
        id: Uuid,
        state: &str,
        offer_expires_at: Option<DateTime<Utc>>,
        offer_start: Option<DateTime<Utc>>,
        offer_end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(UPDATE_WAITLIST_ENTRY_STATE)
            .bind(id)
            .bind(state)
            .bind(offer_expires_at)
            .bind(offer_start)
            .bind(offer_end)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn waitlist_for_user(&self, user_id: Uuid) -> Result<Vec<WaitlistEntry>> {
        Ok(sqlx::query_as::<_, WaitlistEntry>(SELECT_WAITLIST_FOR_USER).bind(user_id).fetch_all(&self.pool).await?)
    }

    async fn expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>> {
        Ok(sqlx::query_as::<_, WaitlistEntry>(SELECT_EXPIRED_OFFERS).bind(now).fetch_all(&self.pool).await?)
    }

    async fn insert_notification(&self, user_id: Uuid, kind: &str, message: &str, link: Option<&str>) -> Result<()> {
        sqlx::query(INSERT_NOTIFICATION)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(kind)
            .bind(message)
            .bind(link)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn notifications_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        Ok(sqlx::query_as::<_, Notification>(SELECT_NOTIFICATIONS_FOR_USER)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let r = sqlx::query(MARK_NOTIFICATION_READ).bind(id).bind(user_id).execute(&self.pool).await?;
        Ok(r.rows_affected() > 0)
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64> {
        let r = sqlx::query(MARK_ALL_NOTIFICATIONS_READ).bind(user_id).execute(&self.pool).await?;
        Ok(r.rows_affected())
    }

    async fn insert_webhook(&self, url: &str, filter: &[String], secret: &str) -> Result<Webhook> {
        let id = Uuid::new_v4();
        sqlx::query(INSERT_WEBHOOK).bind(id).bind(url).bind(filter).bind(secret).execute(&self.pool).await?;
        Ok(self.get_webhook(id).await?.expect("just inserted"))
    }

    async fn active_webhooks_for_event(&self, event: &str) -> Result<Vec<Webhook>> {
        Ok(sqlx::query_as::<_, Webhook>(SELECT_ACTIVE_WEBHOOKS_FOR_EVENT).bind(event).fetch_all(&self.pool).await?)
    }

    async fn get_webhook(&self, id: Uuid) -> Result<Option<Webhook>> {
        Ok(sqlx::query_as::<_, Webhook>(SELECT_WEBHOOK_BY_ID).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        Ok(sqlx::query_as::<_, Webhook>(LIST_WEBHOOKS).fetch_all(&self.pool).await?)
    }

    async fn set_webhook_active(&self, id: Uuid, active: bool) -> Result<()> {
        sqlx::query(UPDATE_WEBHOOK_ACTIVE).bind(id).bind(active).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_webhook_failure_streak(&self, id: Uuid, streak: i32) -> Result<()> {
        sqlx::query(UPDATE_WEBHOOK_FAILURE_STREAK).bind(id).bind(streak).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_webhook(&self, id: Uuid) -> Result<()> {
        sqlx::query(DELETE_WEBHOOK).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_webhook_delivery(
        &self,
        webhook_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<WebhookDelivery> {
        let id = Uuid::new_v4();
        sqlx::query(INSERT_WEBHOOK_DELIVERY)
            .bind(id)
            .bind(webhook_id)
            .bind(event_type)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(sqlx::query_as::<_, WebhookDelivery>("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_webhook_delivery_attempt(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_retry_at: Option<DateTime<Utc>>,
        status_code: Option<i32>,
        response_snippet: Option<&str>,
        delivered: bool,
    ) -> Result<()> {
        sqlx::query(UPDATE_WEBHOOK_DELIVERY_ATTEMPT)
            .bind(id)
            .bind(attempt_count)
            .bind(next_retry_at)
            .bind(status_code)
            .bind(response_snippet)
            .bind(delivered)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_webhook_delivery(&self, id: Uuid) -> Result<()> {
        sqlx::query(RESET_WEBHOOK_DELIVERY_ATTEMPT_COUNT).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn deliveries_due(&self, max_attempts: i32, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>> {
        Ok(sqlx::query_as::<_, WebhookDelivery>(SELECT_DELIVERIES_DUE)
            .bind(max_attempts)
            .bind(now)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn deliveries_for_webhook(
        &self,
        webhook_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>> {
        Ok(sqlx::query_as::<_, WebhookDelivery>(SELECT_DELIVERIES_FOR_WEBHOOK)
            .bind(webhook_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_delivery(&self, webhook_id: Uuid, delivery_id: Uuid) -> Result<Option<WebhookDelivery>> {
        Ok(sqlx::query_as::<_, WebhookDelivery>(SELECT_DELIVERY_BY_ID)
            .bind(delivery_id)
            .bind(webhook_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn append_audit(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        action: &str,
        actor: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(INSERT_AUDIT_HISTORY)
            .bind(Uuid::new_v4())
            .bind(entity_type)
            .bind(entity_id)
            .bind(action)
            .bind(actor)
            .bind(details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
