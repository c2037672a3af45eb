use chrono::{DateTime, Duration, Utc};
use eyre::Result;
use kye_storage::models::{NotificationEvent, NotificationStats, NotificationType};
use serde::Serialize;
use tracing::{error, info};

use crate::engine::{DeliveryOutcome, NotificationEngine};

/// Minutes after which a row left in `sending` is considered abandoned.
pub const STALE_CLAIM_MINUTES: i64 = 10;

/// Tally of one sweep tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub attempted: usize,
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &Result<DeliveryOutcome>) {
        self.attempted += 1;
        match outcome {
            Ok(DeliveryOutcome::Sent) => self.sent += 1,
            Ok(DeliveryOutcome::Retrying { .. }) => self.retrying += 1,
            Ok(DeliveryOutcome::Failed) => self.failed += 1,
            Ok(DeliveryOutcome::Cancelled) => self.cancelled += 1,
            Ok(DeliveryOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }
}

impl NotificationEngine {
    fn batch_size(&self) -> i64 {
        self.settings().sweep_batch_size.max(1) as i64
    }

    async fn deliver_all(&self, sweep: &'static str, rows: Vec<NotificationEvent>) -> SweepReport {
        let mut report = SweepReport::default();
        for row in rows {
            let outcome = self.deliver(row.id).await;
            if let Err(e) = &outcome {
                error!(sweep, notification_id = row.id, error = %e, "Delivery attempt errored");
            }
            report.record(&outcome);
        }
        if report.attempted > 0 {
            info!(sweep, ?report, "Sweep finished");
        }
        report
    }

    /// Deliver due deposit reminders.
    pub async fn sweep_due_reminders(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let rows = self
            .store()
            .due_notifications(Some(NotificationType::DepositReminder), now, self.batch_size())
            .await?;
        Ok(self.deliver_all("due_reminders", rows).await)
    }

    /// Deliver every due pending row, whatever its type.
    pub async fn sweep_pending(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let rows = self
            .store()
            .due_notifications(None, now, self.batch_size())
            .await?;
        Ok(self.deliver_all("pending", rows).await)
    }

    /// Retry `failed` rows that still have attempts left.
    pub async fn sweep_retries(&self) -> Result<SweepReport> {
        let rows = self
            .store()
            .retryable_notifications(self.settings().max_retries as i32, self.batch_size())
            .await?;
        Ok(self.deliver_all("retry", rows).await)
    }

    /// Delete rows created before the retention window, in any status.
    pub async fn sweep_retention(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::days(self.settings().retention_days as i64);
        let deleted = self.store().delete_notifications_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Old notifications deleted");
        }
        Ok(deleted)
    }

    /// Return rows abandoned in `sending` to the queue.
    pub async fn release_stale_claims(&self, now: DateTime<Utc>) -> Result<u64> {
        let released = self
            .store()
            .release_stale_claims(now - Duration::minutes(STALE_CLAIM_MINUTES))
            .await?;
        if released > 0 {
            info!(released, "Stale delivery claims released");
        }
        Ok(released)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<NotificationStats> {
        Ok(self.store().notification_stats(now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, user};
    use kye_storage::Store;
    use kye_storage::models::NotificationStatus;
    use serde_json::json;

    #[tokio::test]
    async fn pending_sweep_only_takes_due_rows() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        let now = Utc::now();
        let due = h
            .engine
            .schedule_notification("U1", NotificationType::Help, &json!({}), now - Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();
        let later = h
            .engine
            .schedule_notification("U1", NotificationType::Help, &json!({}), now + Duration::hours(1))
            .await
            .unwrap()
            .unwrap();

        let report = h.engine.sweep_pending(now).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.sent, 1);

        let due = h.store.get_notification(due.id).await.unwrap().unwrap();
        let later = h.store.get_notification(later.id).await.unwrap().unwrap();
        assert_eq!(due.status, NotificationStatus::Sent);
        assert_eq!(later.status, NotificationStatus::Pending);
    }

    #[tokio::test]
    async fn reminder_sweep_ignores_other_types() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        let now = Utc::now();
        let past = now - Duration::minutes(1);
        h.engine
            .schedule_notification("U1", NotificationType::DepositReminder, &json!({}), past)
            .await
            .unwrap();
        h.engine
            .schedule_notification("U1", NotificationType::Celebration, &json!({}), past)
            .await
            .unwrap();

        let report = h.engine.sweep_due_reminders(now).await.unwrap();
        assert_eq!(report.sent, 1);
        let remaining = h.store.due_notifications(None, now, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].notification_type, NotificationType::Celebration);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_sweep() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        let now = Utc::now();
        for minutes in [3, 2, 1] {
            h.engine
                .schedule_notification(
                    "U1",
                    NotificationType::Help,
                    &json!({}),
                    now - Duration::minutes(minutes),
                )
                .await
                .unwrap();
        }
        h.sender.fail_next(1);

        let report = h.engine.sweep_pending(now).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                attempted: 3,
                sent: 2,
                retrying: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn retry_sweep_picks_failed_rows_with_attempts_left() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        let now = Utc::now();
        let retryable = h
            .engine
            .schedule_notification("U1", NotificationType::Help, &json!({}), now)
            .await
            .unwrap()
            .unwrap();
        let exhausted = h
            .engine
            .schedule_notification("U1", NotificationType::Help, &json!({}), now)
            .await
            .unwrap()
            .unwrap();
        h.store.mark_notification_failed(retryable.id, 1, "timeout").await.unwrap();
        h.store.mark_notification_failed(exhausted.id, 3, "timeout").await.unwrap();

        let report = h.engine.sweep_retries().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.sent, 1);
        let row = h.store.get_notification(exhausted.id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn retention_deletes_old_rows_in_any_status() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        let now = Utc::now();
        let old = h
            .engine
            .send_notification("U1", NotificationType::Help, &json!({}))
            .await
            .unwrap()
            .unwrap();
        let fresh = h
            .engine
            .schedule_notification("U1", NotificationType::Help, &json!({}), now)
            .await
            .unwrap()
            .unwrap();
        h.store.backdate_notification(old.id, now - Duration::days(31));

        assert_eq!(h.engine.sweep_retention(now).await.unwrap(), 1);
        assert!(h.store.get_notification(old.id).await.unwrap().is_none());
        assert!(h.store.get_notification(fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn abandoned_claims_return_to_the_queue() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        let row = h
            .engine
            .schedule_notification("U1", NotificationType::Help, &json!({}), Utc::now())
            .await
            .unwrap()
            .unwrap();
        h.store.claim_notification(row.id, 3).await.unwrap();

        assert_eq!(h.engine.release_stale_claims(Utc::now()).await.unwrap(), 0);
        let later = Utc::now() + Duration::minutes(STALE_CLAIM_MINUTES + 1);
        assert_eq!(h.engine.release_stale_claims(later).await.unwrap(), 1);
        assert_eq!(h.engine.deliver(row.id).await.unwrap(), DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn stats_report_success_rate_over_finished_rows() {
        let h = harness();
        user(&h.store, "U1", "0xa").await;
        for _ in 0..3 {
            h.engine
                .send_notification("U1", NotificationType::Help, &json!({}))
                .await
                .unwrap();
        }
        let failed = h
            .engine
            .schedule_notification("U1", NotificationType::Welcome, &json!({}), Utc::now())
            .await
            .unwrap()
            .unwrap();
        h.store.mark_notification_failed(failed.id, 3, "boom").await.unwrap();

        let stats = h.engine.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.total_sent, 3);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.last_24h, 4);
        assert_eq!(stats.by_type[0].notification_type, "HELP");
        assert_eq!(stats.by_type[0].count, 3);
    }
}
