//! In-memory [`Store`] used by tests and local dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;

use crate::StoreResult;
use crate::models::*;
use crate::store::Store;

#[derive(Default)]
struct Inner {
    checkpoint: Option<u64>,
    monitored: Vec<String>,
    events: BTreeMap<EventKey, BlockchainEvent>,
    circles: BTreeMap<String, Circle>,
    members: BTreeMap<(String, String), CircleMember>,
    ledgers: HashMap<Ledger, Vec<LedgerEntry>>,
    users: BTreeMap<String, User>,
    notifications: BTreeMap<i64, NotificationEvent>,
    next_notification_id: i64,
}

impl Inner {
    fn recount(&mut self, circle_address: &str) -> i64 {
        let count = self
            .members
            .keys()
            .filter(|(circle, _)| circle == circle_address)
            .count() as i64;
        if let Some(circle) = self.circles.get_mut(circle_address) {
            circle.member_count = count as i32;
        }
        count
    }

    fn upsert_member(&mut self, member: &CircleMember) {
        let key = (member.circle_address.clone(), member.wallet_address.clone());
        match self.members.get_mut(&key) {
            Some(existing) if existing.user_id_hash.is_empty() => {
                existing.user_id_hash = member.user_id_hash.clone();
            }
            Some(_) => {}
            None => {
                self.members.insert(key, member.clone());
            }
        }
    }

    fn update_notification<F>(&mut self, id: i64, f: F)
    where
        F: FnOnce(&mut NotificationEvent),
    {
        if let Some(n) = self.notifications.get_mut(&id) {
            f(n);
            n.updated_at = Utc::now();
        }
    }
}

/// A [`Store`] that keeps every table in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ledger_entries(&self, ledger: Ledger) -> Vec<LedgerEntry> {
        self.lock().ledgers.get(&ledger).cloned().unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.lock().notifications.values().cloned().collect()
    }

    pub fn events(&self) -> Vec<BlockchainEvent> {
        self.lock().events.values().cloned().collect()
    }

    /// Rewrite `created_at` of a queued row, for retention scenarios.
    pub fn backdate_notification(&self, id: i64, created_at: DateTime<Utc>) {
        if let Some(n) = self.lock().notifications.get_mut(&id) {
            n.created_at = created_at;
            n.updated_at = created_at;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_checkpoint(&self) -> StoreResult<Option<u64>> {
        Ok(self.lock().checkpoint)
    }

    async fn set_checkpoint(&self, block: u64) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.checkpoint = Some(inner.checkpoint.map_or(block, |current| current.max(block)));
        Ok(())
    }

    async fn list_monitored_contracts(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock().monitored.clone())
    }

    async fn add_monitored_contract(&self, address: &str) -> StoreResult<bool> {
        let mut inner = self.lock();
        if inner.monitored.iter().any(|a| a == address) {
            return Ok(false);
        }
        inner.monitored.push(address.to_string());
        Ok(true)
    }

    async fn remove_monitored_contract(&self, address: &str) -> StoreResult<bool> {
        let mut inner = self.lock();
        let before = inner.monitored.len();
        inner.monitored.retain(|a| a != address);
        Ok(inner.monitored.len() != before)
    }

    async fn record_event(
        &self,
        event: &NewBlockchainEvent,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<EventRecordState> {
        let mut inner = self.lock();
        let key = event.key();
        let now = Utc::now();
        if let Some(existing) = inner.events.get_mut(&key) {
            if existing.handled_at.is_some() {
                return Ok(EventRecordState::Handled);
            }
            return Ok(match existing.dispatch_claimed_at {
                Some(at) if at >= stale_before => EventRecordState::InFlight,
                _ => {
                    existing.dispatch_claimed_at = Some(now);
                    EventRecordState::Unhandled
                }
            });
        }
        inner.events.insert(
            key,
            BlockchainEvent {
                event_name: event.event_name.clone(),
                contract_address: event.contract_address.clone(),
                block_number: event.block_number,
                log_index: event.log_index,
                transaction_hash: event.transaction_hash.clone(),
                args: Json(event.args.clone()),
                timestamp: event.timestamp,
                dispatch_claimed_at: Some(now),
                handled_at: None,
            },
        );
        Ok(EventRecordState::Inserted)
    }

    async fn mark_event_handled(&self, key: &EventKey) -> StoreResult<()> {
        if let Some(event) = self.lock().events.get_mut(key) {
            event.handled_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn count_events(&self) -> StoreResult<i64> {
        Ok(self.lock().events.len() as i64)
    }

    async fn insert_circle(&self, circle: &NewCircle) -> StoreResult<bool> {
        let mut inner = self.lock();
        if inner.circles.contains_key(&circle.circle_address) {
            return Ok(false);
        }
        inner.circles.insert(
            circle.circle_address.clone(),
            Circle {
                circle_address: circle.circle_address.clone(),
                group_id: None,
                group_id_hash: circle.group_id_hash.clone(),
                creator_id: circle.creator_id.clone(),
                creator_address: circle.creator_address.clone(),
                status: CircleStatus::Setup,
                member_count: 0,
                max_members: circle.max_members,
                deposit_amount: circle.deposit_amount.clone(),
                current_round: 0,
                next_deadline: None,
                created_at: circle.created_at,
                metadata: Json(circle.metadata.clone()),
            },
        );
        inner.upsert_member(&CircleMember {
            circle_address: circle.circle_address.clone(),
            wallet_address: circle.creator_address.clone(),
            user_id_hash: String::new(),
            joined_at: circle.created_at,
        });
        inner.recount(&circle.circle_address);
        Ok(true)
    }

    async fn get_circle(&self, address: &str) -> StoreResult<Option<Circle>> {
        Ok(self.lock().circles.get(address).cloned())
    }

    async fn get_circles_by_group(&self, group_id: &str) -> StoreResult<Vec<Circle>> {
        Ok(self
            .lock()
            .circles
            .values()
            .filter(|c| c.group_id.as_deref() == Some(group_id))
            .cloned()
            .collect())
    }

    async fn get_active_circles(&self) -> StoreResult<Vec<Circle>> {
        Ok(self
            .lock()
            .circles
            .values()
            .filter(|c| c.status == CircleStatus::Active)
            .cloned()
            .collect())
    }

    async fn set_circle_group(&self, address: &str, group_id: &str) -> StoreResult<bool> {
        Ok(match self.lock().circles.get_mut(address) {
            Some(circle) => {
                circle.group_id = Some(group_id.to_string());
                true
            }
            None => false,
        })
    }

    async fn update_circle_status(
        &self,
        address: &str,
        status: CircleStatus,
    ) -> StoreResult<bool> {
        Ok(match self.lock().circles.get_mut(address) {
            Some(circle) => {
                circle.status = status;
                true
            }
            None => false,
        })
    }

    async fn update_circle_round(
        &self,
        address: &str,
        round: i32,
        deadline: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(match self.lock().circles.get_mut(address) {
            Some(circle) if circle.current_round <= round => {
                circle.current_round = round;
                circle.next_deadline = Some(deadline);
                true
            }
            _ => false,
        })
    }

    async fn add_circle_member(&self, member: &CircleMember) -> StoreResult<i64> {
        let mut inner = self.lock();
        inner.upsert_member(member);
        Ok(inner.recount(&member.circle_address))
    }

    async fn list_circle_members(&self, address: &str) -> StoreResult<Vec<CircleMember>> {
        let mut members: Vec<CircleMember> = self
            .lock()
            .members
            .values()
            .filter(|m| m.circle_address == address)
            .cloned()
            .collect();
        members.sort_by(|a, b| {
            (a.joined_at, &a.wallet_address).cmp(&(b.joined_at, &b.wallet_address))
        });
        Ok(members)
    }

    async fn circle_stats(&self) -> StoreResult<CircleStats> {
        let inner = self.lock();
        let mut by_status: BTreeMap<&'static str, i64> = BTreeMap::new();
        let mut stats = CircleStats::default();
        for circle in inner.circles.values() {
            *by_status.entry(circle.status.as_str()).or_default() += 1;
            stats.total_circles += 1;
            stats.total_members += circle.member_count as i64;
        }
        stats.by_status = by_status
            .into_iter()
            .map(|(status, count)| StatusCount {
                status: status.to_string(),
                count,
            })
            .collect();
        Ok(stats)
    }

    async fn insert_ledger_entry(&self, ledger: Ledger, entry: &LedgerEntry) -> StoreResult<()> {
        let mut inner = self.lock();
        let rows = inner.ledgers.entry(ledger).or_default();
        let duplicate = rows.iter().any(|r| {
            r.circle_address == entry.circle_address
                && r.round_index == entry.round_index
                && r.member_address == entry.member_address
                && r.transaction_hash == entry.transaction_hash
        });
        if !duplicate {
            rows.push(entry.clone());
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn get_user_by_wallet(&self, wallet: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.wallet_address.as_deref() == Some(wallet))
            .cloned())
    }

    async fn upsert_user(&self, user: &NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let mut inner = self.lock();
        let row = inner
            .users
            .entry(user.user_id.clone())
            .and_modify(|existing| {
                if user.display_name.is_some() {
                    existing.display_name = user.display_name.clone();
                }
                if user.picture_url.is_some() {
                    existing.picture_url = user.picture_url.clone();
                }
                existing.last_activity = now;
            })
            .or_insert_with(|| User {
                user_id: user.user_id.clone(),
                display_name: user.display_name.clone(),
                picture_url: user.picture_url.clone(),
                wallet_address: None,
                language: user.language,
                notification_preferences: Json(NotificationPreferences::default()),
                created_at: now,
                last_activity: now,
            });
        Ok(row.clone())
    }

    async fn touch_user(&self, user_id: &str) -> StoreResult<()> {
        if let Some(user) = self.lock().users.get_mut(user_id) {
            user.last_activity = Utc::now();
        }
        Ok(())
    }

    async fn set_user_wallet(&self, user_id: &str, wallet: Option<&str>) -> StoreResult<bool> {
        let mut inner = self.lock();
        if let Some(wallet) = wallet {
            // Mirrors the UNIQUE constraint on users.wallet_address.
            let taken = inner
                .users
                .values()
                .any(|u| u.user_id != user_id && u.wallet_address.as_deref() == Some(wallet));
            if taken {
                return Err(sqlx::Error::Protocol(format!("wallet {wallet} already linked")).into());
            }
        }
        Ok(match inner.users.get_mut(user_id) {
            Some(user) => {
                user.wallet_address = wallet.map(str::to_string);
                true
            }
            None => false,
        })
    }

    async fn update_user_preferences(
        &self,
        user_id: &str,
        language: Option<Language>,
        preferences: Option<&NotificationPreferences>,
    ) -> StoreResult<bool> {
        Ok(match self.lock().users.get_mut(user_id) {
            Some(user) => {
                if let Some(language) = language {
                    user.language = language;
                }
                if let Some(preferences) = preferences {
                    user.notification_preferences = Json(preferences.clone());
                }
                true
            }
            None => false,
        })
    }

    async fn insert_notification(&self, n: &NewNotification) -> StoreResult<NotificationEvent> {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.next_notification_id += 1;
        let row = NotificationEvent {
            id: inner.next_notification_id,
            notification_type: n.notification_type,
            user_id: n.user_id.clone(),
            circle_address: n.circle_address.clone(),
            message_content: Json(n.message_content.clone()),
            scheduled_time: n.scheduled_time,
            status: NotificationStatus::Pending,
            retry_count: 0,
            metadata: Json(n.metadata.clone()),
            last_error: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
        };
        inner.notifications.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_notification(&self, id: i64) -> StoreResult<Option<NotificationEvent>> {
        Ok(self.lock().notifications.get(&id).cloned())
    }

    async fn notifications_by_status(
        &self,
        status: NotificationStatus,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>> {
        let mut rows: Vec<NotificationEvent> = self
            .lock()
            .notifications
            .values()
            .filter(|n| n.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|n| (n.scheduled_time, n.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn due_notifications(
        &self,
        kind: Option<NotificationType>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>> {
        let mut rows: Vec<NotificationEvent> = self
            .lock()
            .notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Pending && n.scheduled_time <= now)
            .filter(|n| kind.is_none_or(|k| n.notification_type == k))
            .cloned()
            .collect();
        rows.sort_by_key(|n| (n.scheduled_time, n.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn retryable_notifications(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> StoreResult<Vec<NotificationEvent>> {
        let mut rows: Vec<NotificationEvent> = self
            .lock()
            .notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Failed && n.retry_count < max_retries)
            .cloned()
            .collect();
        rows.sort_by_key(|n| (n.updated_at, n.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn claim_notification(
        &self,
        id: i64,
        max_retries: i32,
    ) -> StoreResult<Option<NotificationEvent>> {
        let mut inner = self.lock();
        let Some(n) = inner.notifications.get_mut(&id) else {
            return Ok(None);
        };
        let claimable = match n.status {
            NotificationStatus::Pending => true,
            NotificationStatus::Failed => n.retry_count < max_retries,
            _ => false,
        };
        if !claimable {
            return Ok(None);
        }
        n.status = NotificationStatus::Sending;
        n.updated_at = Utc::now();
        Ok(Some(n.clone()))
    }

    async fn mark_notification_sent(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.lock().update_notification(id, |n| {
            n.status = NotificationStatus::Sent;
            n.sent_at = Some(at);
            n.last_error = None;
        });
        Ok(())
    }

    async fn mark_notification_cancelled(&self, id: i64, reason: &str) -> StoreResult<()> {
        self.lock().update_notification(id, |n| {
            n.status = NotificationStatus::Cancelled;
            n.last_error = Some(reason.to_string());
        });
        Ok(())
    }

    async fn mark_notification_failed(
        &self,
        id: i64,
        retry_count: i32,
        error: &str,
    ) -> StoreResult<()> {
        self.lock().update_notification(id, |n| {
            n.status = NotificationStatus::Failed;
            n.retry_count = retry_count;
            n.last_error = Some(error.to_string());
        });
        Ok(())
    }

    async fn reschedule_notification(
        &self,
        id: i64,
        retry_count: i32,
        next_attempt: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()> {
        self.lock().update_notification(id, |n| {
            n.status = NotificationStatus::Pending;
            n.retry_count = retry_count;
            n.scheduled_time = next_attempt;
            n.last_error = Some(error.to_string());
        });
        Ok(())
    }

    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let mut released = 0;
        for n in self.lock().notifications.values_mut() {
            if n.status == NotificationStatus::Sending && n.updated_at < older_than {
                n.status = NotificationStatus::Pending;
                n.updated_at = Utc::now();
                released += 1;
            }
        }
        Ok(released)
    }

    async fn delete_notifications_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.created_at >= cutoff);
        Ok((before - inner.notifications.len()) as u64)
    }

    async fn notification_stats(&self, now: DateTime<Utc>) -> StoreResult<NotificationStats> {
        let inner = self.lock();
        let since = now - Duration::hours(24);
        let mut stats = NotificationStats::default();
        let mut by_type: BTreeMap<&'static str, i64> = BTreeMap::new();
        for n in inner.notifications.values() {
            stats.total += 1;
            match n.status {
                NotificationStatus::Sent => stats.total_sent += 1,
                NotificationStatus::Failed => stats.total_failed += 1,
                NotificationStatus::Cancelled => stats.total_cancelled += 1,
                NotificationStatus::Pending => stats.total_pending += 1,
                NotificationStatus::Sending => {}
            }
            if n.created_at >= since {
                stats.last_24h += 1;
            }
            *by_type.entry(n.notification_type.as_str()).or_default() += 1;
        }
        stats.success_rate = NotificationStats::rate(stats.total_sent, stats.total_failed);
        let mut by_type: Vec<TypeCount> = by_type
            .into_iter()
            .map(|(t, count)| TypeCount {
                notification_type: t.to_string(),
                count,
            })
            .collect();
        by_type.sort_by(|a, b| b.count.cmp(&a.count).then(a.notification_type.cmp(&b.notification_type)));
        stats.by_type = by_type;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kye_messaging::MessageContent;
    use serde_json::json;

    fn new_circle(address: &str, creator: &str) -> NewCircle {
        NewCircle {
            circle_address: address.into(),
            group_id_hash: "0xgroup".into(),
            creator_id: None,
            creator_address: creator.into(),
            max_members: 5,
            deposit_amount: "100000000".into(),
            created_at: Utc::now(),
            metadata: CircleMetadata::default(),
        }
    }

    fn member(circle: &str, wallet: &str, hash: &str) -> CircleMember {
        CircleMember {
            circle_address: circle.into(),
            wallet_address: wallet.into(),
            user_id_hash: hash.into(),
            joined_at: Utc::now(),
        }
    }

    fn notification(kind: NotificationType, at: DateTime<Utc>) -> NewNotification {
        NewNotification {
            notification_type: kind,
            user_id: "U1".into(),
            circle_address: None,
            message_content: MessageContent::text("hi"),
            scheduled_time: at,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn checkpoint_never_moves_backwards() {
        let store = MemoryStore::new();
        assert_eq!(store.get_checkpoint().await.unwrap(), None);
        store.set_checkpoint(100).await.unwrap();
        store.set_checkpoint(90).await.unwrap();
        assert_eq!(store.get_checkpoint().await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn member_count_follows_membership_rows() {
        let store = MemoryStore::new();
        assert!(store.insert_circle(&new_circle("0xc1", "0xa")).await.unwrap());
        assert!(!store.insert_circle(&new_circle("0xc1", "0xa")).await.unwrap());
        assert_eq!(store.get_circle("0xc1").await.unwrap().unwrap().member_count, 1);

        // Creator joining again only fills in the hash.
        assert_eq!(store.add_circle_member(&member("0xc1", "0xa", "0xh1")).await.unwrap(), 1);
        assert_eq!(store.add_circle_member(&member("0xc1", "0xb", "0xh2")).await.unwrap(), 2);
        assert_eq!(store.add_circle_member(&member("0xc1", "0xb", "0xh2")).await.unwrap(), 2);

        let members = store.list_circle_members("0xc1").await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| !m.user_id_hash.is_empty()));
        assert_eq!(store.get_circle("0xc1").await.unwrap().unwrap().member_count, 2);
    }

    #[tokio::test]
    async fn event_record_reports_handling_state() {
        let store = MemoryStore::new();
        let event = NewBlockchainEvent {
            event_name: "MemberJoined".into(),
            contract_address: "0xc1".into(),
            block_number: 10,
            log_index: 0,
            transaction_hash: "0xtx".into(),
            args: json!({}),
            timestamp: Utc::now(),
        };
        let live = Utc::now() - Duration::minutes(10);
        assert_eq!(store.record_event(&event, live).await.unwrap(), EventRecordState::Inserted);
        assert_eq!(store.record_event(&event, live).await.unwrap(), EventRecordState::InFlight);

        // an abandoned claim is taken over once it is stale
        let later = Utc::now() + Duration::seconds(1);
        assert_eq!(store.record_event(&event, later).await.unwrap(), EventRecordState::Unhandled);
        assert_eq!(store.record_event(&event, live).await.unwrap(), EventRecordState::InFlight);

        store.mark_event_handled(&event.key()).await.unwrap();
        assert_eq!(store.record_event(&event, later).await.unwrap(), EventRecordState::Handled);
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let store = MemoryStore::new();
        let row = store
            .insert_notification(&notification(NotificationType::Welcome, Utc::now()))
            .await
            .unwrap();
        assert!(store.claim_notification(row.id, 3).await.unwrap().is_some());
        assert!(store.claim_notification(row.id, 3).await.unwrap().is_none());

        store.mark_notification_sent(row.id, Utc::now()).await.unwrap();
        assert!(store.claim_notification(row.id, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausted_failed_rows_cannot_be_claimed() {
        let store = MemoryStore::new();
        let row = store
            .insert_notification(&notification(NotificationType::Help, Utc::now()))
            .await
            .unwrap();
        store.mark_notification_failed(row.id, 3, "boom").await.unwrap();
        assert!(store.claim_notification(row.id, 3).await.unwrap().is_none());
        assert!(store.claim_notification(row.id, 4).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn due_query_filters_by_time_and_type() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_notification(&notification(NotificationType::DepositReminder, now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .insert_notification(&notification(NotificationType::DepositReminder, now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .insert_notification(&notification(NotificationType::Help, now - Duration::minutes(5)))
            .await
            .unwrap();

        let all = store.due_notifications(None, now, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].notification_type, NotificationType::Help);

        let reminders = store
            .due_notifications(Some(NotificationType::DepositReminder), now, 10)
            .await
            .unwrap();
        assert_eq!(reminders.len(), 1);
    }

    #[tokio::test]
    async fn stale_claims_are_released() {
        let store = MemoryStore::new();
        let row = store
            .insert_notification(&notification(NotificationType::Help, Utc::now()))
            .await
            .unwrap();
        store.claim_notification(row.id, 3).await.unwrap();
        assert_eq!(store.release_stale_claims(Utc::now() - Duration::minutes(10)).await.unwrap(), 0);
        assert_eq!(store.release_stale_claims(Utc::now() + Duration::seconds(1)).await.unwrap(), 1);
        let row = store.get_notification(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
    }

    #[tokio::test]
    async fn wallet_is_unique_across_users() {
        let store = MemoryStore::new();
        for id in ["U1", "U2"] {
            store
                .upsert_user(&NewUser {
                    user_id: id.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        assert!(store.set_user_wallet("U1", Some("0xw")).await.unwrap());
        assert!(store.set_user_wallet("U2", Some("0xw")).await.is_err());
        assert_eq!(
            store.get_user_by_wallet("0xw").await.unwrap().unwrap().user_id,
            "U1"
        );
        assert!(store.set_user_wallet("U1", None).await.unwrap());
        assert!(store.get_user_by_wallet("0xw").await.unwrap().is_none());
    }
}
