use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::StoreResult;
use crate::models::*;
use crate::repos;

/// The durable store both engines run against.
///
/// Addresses are lowercase `0x`-prefixed hex strings throughout.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Checkpoint ──────────────────────────────────────────────────────

    async fn get_checkpoint(&self) -> StoreResult<Option<u64>>;

    /// Advance the checkpoint. A lower value than the stored one is ignored.
    async fn set_checkpoint(&self, block: u64) -> StoreResult<()>;

    // ── Monitored contracts ─────────────────────────────────────────────

    async fn list_monitored_contracts(&self) -> StoreResult<Vec<String>>;

    /// Returns `true` when the address was not monitored before.
    async fn add_monitored_contract(&self, address: &str) -> StoreResult<bool>;

    async fn remove_monitored_contract(&self, address: &str) -> StoreResult<bool>;

    // ── Blockchain events ───────────────────────────────────────────────

    /// Insert the event unless its idempotency key already exists, and take
    /// its dispatch claim when free or older than `stale_before`.
    async fn record_event(
        &self,
        event: &NewBlockchainEvent,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<EventRecordState>;

    async fn mark_event_handled(&self, key: &EventKey) -> StoreResult<()>;

    async fn count_events(&self) -> StoreResult<i64>;

    // ── Circles ─────────────────────────────────────────────────────────

    /// Insert a circle together with its creator as first member.
    /// Returns `false` when the circle already exists.
    async fn insert_circle(&self, circle: &NewCircle) -> StoreResult<bool>;

    async fn get_circle(&self, address: &str) -> StoreResult<Option<Circle>>;

    async fn get_circles_by_group(&self, group_id: &str) -> StoreResult<Vec<Circle>>;

    async fn get_active_circles(&self) -> StoreResult<Vec<Circle>>;

    async fn set_circle_group(&self, address: &str, group_id: &str) -> StoreResult<bool>;

    async fn update_circle_status(&self, address: &str, status: CircleStatus)
    -> StoreResult<bool>;

    /// Move the circle to `round`; rounds never go backwards.
    async fn update_circle_round(
        &self,
        address: &str,
        round: i32,
        deadline: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Add a member (idempotent) and return the recomputed member count.
    async fn add_circle_member(&self, member: &CircleMember) -> StoreResult<i64>;

    async fn list_circle_members(&self, address: &str) -> StoreResult<Vec<CircleMember>>;

    async fn circle_stats(&self) -> StoreResult<CircleStats>;

    // ── Ledgers ─────────────────────────────────────────────────────────

    async fn insert_ledger_entry(&self, ledger: Ledger, entry: &LedgerEntry) -> StoreResult<()>;

    // ── Users ───────────────────────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    async fn get_user_by_wallet(&self, wallet: &str) -> StoreResult<Option<User>>;

    /// Create the user, or refresh profile fields of an existing one.
    async fn upsert_user(&self, user: &NewUser) -> StoreResult<User>;

    /// Bump `last_activity`.
    async fn touch_user(&self, user_id: &str) -> StoreResult<()>;

    /// Link or unlink (`None`) a wallet.
    async fn set_user_wallet(&self, user_id: &str, wallet: Option<&str>) -> StoreResult<bool>;

    async fn update_user_preferences(
        &self,
        user_id: &str,
        language: Option<Language>,
        preferences: Option<&NotificationPreferences>,
    ) -> StoreResult<bool>;

    // ── Notification queue ──────────────────────────────────────────────

    async fn insert_notification(&self, n: &NewNotification) -> StoreResult<NotificationEvent>;

    async fn get_notification(&self, id: i64) -> StoreResult<Option<NotificationEvent>>;

    async fn notifications_by_status(
        &self,
        status: NotificationStatus,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>>;

    /// `pending` rows with `scheduled_time <= now`, oldest first, optionally of one type.
    async fn due_notifications(
        &self,
        kind: Option<NotificationType>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>>;

    /// `failed` rows that still have retries left.
    async fn retryable_notifications(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>>;

    /// Atomically move a `pending` row, or a `failed` row with retries left,
    /// to `sending`. `None` means another worker owns it or it is final.
    async fn claim_notification(
        &self,
        id: i64,
        max_retries: i32,
    ) -> StoreResult<Option<NotificationEvent>>;

    async fn mark_notification_sent(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    async fn mark_notification_cancelled(&self, id: i64, reason: &str) -> StoreResult<()>;

    async fn mark_notification_failed(
        &self,
        id: i64,
        retry_count: i32,
        error: &str,
    ) -> StoreResult<()>;

    /// Put a row back to `pending` for another attempt at `next_attempt`.
    async fn reschedule_notification(
        &self,
        id: i64,
        retry_count: i32,
        next_attempt: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()>;

    /// Return rows stuck in `sending` since before `older_than` to `pending`.
    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> StoreResult<u64>;

    async fn delete_notifications_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn notification_stats(&self, now: DateTime<Utc>) -> StoreResult<NotificationStats>;
}

/// [`Store`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_checkpoint(&self) -> StoreResult<Option<u64>> {
        Ok(repos::get_checkpoint(&self.pool).await?.map(|b| b as u64))
    }

    async fn set_checkpoint(&self, block: u64) -> StoreResult<()> {
        Ok(repos::set_checkpoint(&self.pool, block as i64).await?)
    }

    async fn list_monitored_contracts(&self) -> StoreResult<Vec<String>> {
        Ok(repos::list_monitored_contracts(&self.pool).await?)
    }

    async fn add_monitored_contract(&self, address: &str) -> StoreResult<bool> {
        Ok(repos::add_monitored_contract(&self.pool, address).await?)
    }

    async fn remove_monitored_contract(&self, address: &str) -> StoreResult<bool> {
        Ok(repos::remove_monitored_contract(&self.pool, address).await?)
    }

    async fn record_event(
        &self,
        event: &NewBlockchainEvent,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<EventRecordState> {
        Ok(repos::record_event(&self.pool, event, stale_before).await?)
    }

    async fn mark_event_handled(&self, key: &EventKey) -> StoreResult<()> {
        Ok(repos::mark_event_handled(&self.pool, key).await?)
    }

    async fn count_events(&self) -> StoreResult<i64> {
        Ok(repos::count_events(&self.pool).await?)
    }

    async fn insert_circle(&self, circle: &NewCircle) -> StoreResult<bool> {
        Ok(repos::insert_circle(&self.pool, circle).await?)
    }

    async fn get_circle(&self, address: &str) -> StoreResult<Option<Circle>> {
        Ok(repos::get_circle(&self.pool, address).await?)
    }

    async fn get_circles_by_group(&self, group_id: &str) -> StoreResult<Vec<Circle>> {
        Ok(repos::get_circles_by_group(&self.pool, group_id).await?)
    }

    async fn get_active_circles(&self) -> StoreResult<Vec<Circle>> {
        Ok(repos::get_circles_by_status(&self.pool, CircleStatus::Active).await?)
    }

    async fn set_circle_group(&self, address: &str, group_id: &str) -> StoreResult<bool> {
        Ok(repos::set_circle_group(&self.pool, address, group_id).await?)
    }

    async fn update_circle_status(
        &self,
        address: &str,
        status: CircleStatus,
    ) -> StoreResult<bool> {
        Ok(repos::update_circle_status(&self.pool, address, status).await?)
    }

    async fn update_circle_round(
        &self,
        address: &str,
        round: i32,
        deadline: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(repos::update_circle_round(&self.pool, address, round, deadline).await?)
    }

    async fn add_circle_member(&self, member: &CircleMember) -> StoreResult<i64> {
        Ok(repos::add_circle_member(&self.pool, member).await?)
    }

    async fn list_circle_members(&self, address: &str) -> StoreResult<Vec<CircleMember>> {
        Ok(repos::list_circle_members(&self.pool, address).await?)
    }

    async fn circle_stats(&self) -> StoreResult<CircleStats> {
        Ok(repos::circle_stats(&self.pool).await?)
    }

    async fn insert_ledger_entry(&self, ledger: Ledger, entry: &LedgerEntry) -> StoreResult<()> {
        Ok(repos::insert_ledger_entry(&self.pool, ledger, entry).await?)
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(repos::get_user(&self.pool, user_id).await?)
    }

    async fn get_user_by_wallet(&self, wallet: &str) -> StoreResult<Option<User>> {
        Ok(repos::get_user_by_wallet(&self.pool, wallet).await?)
    }

    async fn upsert_user(&self, user: &NewUser) -> StoreResult<User> {
        Ok(repos::upsert_user(&self.pool, user).await?)
    }

    async fn touch_user(&self, user_id: &str) -> StoreResult<()> {
        Ok(repos::touch_user(&self.pool, user_id).await?)
    }

    async fn set_user_wallet(&self, user_id: &str, wallet: Option<&str>) -> StoreResult<bool> {
        Ok(repos::set_user_wallet(&self.pool, user_id, wallet).await?)
    }

    async fn update_user_preferences(
        &self,
        user_id: &str,
        language: Option<Language>,
        preferences: Option<&NotificationPreferences>,
    ) -> StoreResult<bool> {
        Ok(repos::update_user_preferences(&self.pool, user_id, language, preferences).await?)
    }

    async fn insert_notification(&self, n: &NewNotification) -> StoreResult<NotificationEvent> {
        Ok(repos::insert_notification(&self.pool, n).await?)
    }

    async fn get_notification(&self, id: i64) -> StoreResult<Option<NotificationEvent>> {
        Ok(repos::get_notification(&self.pool, id).await?)
    }

    async fn notifications_by_status(
        &self,
        status: NotificationStatus,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>> {
        Ok(repos::notifications_by_status(&self.pool, status, limit).await?)
    }

    async fn due_notifications(
        &self,
        kind: Option<NotificationType>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>> {
        Ok(repos::due_notifications(&self.pool, kind, now, limit).await?)
    }

    async fn retryable_notifications(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>> {
        Ok(repos::retryable_notifications(&self.pool, max_retries, limit).await?)
    }

    async fn claim_notification(
        &self,
        id: i64,
        max_retries: i32,
    ) -> StoreResult<Option<NotificationEvent>> {
        Ok(repos::claim_notification(&self.pool, id, max_retries).await?)
    }

    async fn mark_notification_sent(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        Ok(repos::mark_notification_sent(&self.pool, id, at).await?)
    }

    async fn mark_notification_cancelled(&self, id: i64, reason: &str) -> StoreResult<()> {
        Ok(repos::mark_notification_cancelled(&self.pool, id, reason).await?)
    }

    async fn mark_notification_failed(
        &self,
        id: i64,
        retry_count: i32,
        error: &str,
    ) -> StoreResult<()> {
        Ok(repos::mark_notification_failed(&self.pool, id, retry_count, error).await?)
    }

    async fn reschedule_notification(
        &self,
        id: i64,
        retry_count: i32,
        next_attempt: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()> {
        Ok(
            repos::reschedule_notification(&self.pool, id, retry_count, next_attempt, error)
                .await?,
        )
    }

    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        Ok(repos::release_stale_claims(&self.pool, older_than).await?)
    }

    async fn delete_notifications_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Ok(repos::delete_notifications_before(&self.pool, cutoff).await?)
    }

    async fn notification_stats(&self, now: DateTime<Utc>) -> StoreResult<NotificationStats> {
        Ok(repos::notification_stats(&self.pool, now).await?)
    }
}
