use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use eyre::Result;
use kye_core::NotificationSettings;
use kye_messaging::MessageSender;
use kye_storage::Store;
use kye_storage::models::{NewNotification, NotificationEvent, NotificationType, User};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::preferences::should_send;
use crate::reminders::reminder_slots;
use crate::templates::render;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// The recipient blocked the bot.
    Cancelled,
    /// Sending failed; the row is pending again at `next_attempt`.
    Retrying {
        retry_count: i32,
        next_attempt: DateTime<Utc>,
    },
    /// Sending failed with no retries left.
    Failed,
    /// Another worker holds the row, or it is already final.
    Skipped,
}

/// Turns notification requests into queued, retried deliveries.
pub struct NotificationEngine {
    store: Arc<dyn Store>,
    sender: Arc<dyn MessageSender>,
    settings: NotificationSettings,
}

impl NotificationEngine {
    pub fn new(
        store: Arc<dyn Store>,
        sender: Arc<dyn MessageSender>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            store,
            sender,
            settings,
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Queue a notification for now and attempt delivery right away.
    ///
    /// Returns `None` when the user is unknown or has opted out of `kind`.
    pub async fn send_notification(
        &self,
        user_id: &str,
        kind: NotificationType,
        payload: &Value,
    ) -> Result<Option<NotificationEvent>> {
        let Some(row) = self.enqueue(user_id, kind, payload, Utc::now()).await? else {
            return Ok(None);
        };

        let outcome = self.deliver(row.id).await?;
        debug!(notification_id = row.id, ?outcome, "Immediate delivery finished");
        Ok(self.store.get_notification(row.id).await?)
    }

    /// Queue a notification for the sweeps to deliver at `at`.
    pub async fn schedule_notification(
        &self,
        user_id: &str,
        kind: NotificationType,
        payload: &Value,
        at: DateTime<Utc>,
    ) -> Result<Option<NotificationEvent>> {
        self.enqueue(user_id, kind, payload, at).await
    }

    async fn enqueue(
        &self,
        user_id: &str,
        kind: NotificationType,
        payload: &Value,
        at: DateTime<Utc>,
    ) -> Result<Option<NotificationEvent>> {
        let Some(user) = self.store.get_user(user_id).await? else {
            info!(user_id = %user_id, kind = %kind, "Unknown user, notification dropped");
            return Ok(None);
        };
        if !should_send(&user.notification_preferences, kind) {
            debug!(user_id = %user_id, kind = %kind, "Filtered by user preferences");
            return Ok(None);
        }

        let row = self
            .store
            .insert_notification(&new_notification(&user, kind, payload, at))
            .await?;
        debug!(notification_id = row.id, kind = %kind, scheduled = %at, "Notification queued");
        Ok(Some(row))
    }

    /// Schedule deposit reminders for every member of a circle except the
    /// round's beneficiary. Returns the number of reminders queued.
    pub async fn schedule_deposit_reminders(
        &self,
        circle_address: &str,
        deadline: DateTime<Utc>,
        beneficiary: Option<&str>,
    ) -> Result<usize> {
        let Some(circle) = self.store.get_circle(circle_address).await? else {
            warn!(circle = %circle_address, "Cannot schedule reminders for unknown circle");
            return Ok(0);
        };

        let now = Utc::now();
        let mut scheduled = 0;
        for member in self.store.list_circle_members(circle_address).await? {
            if Some(member.wallet_address.as_str()) == beneficiary {
                continue;
            }
            let Some(user) = self.store.get_user_by_wallet(&member.wallet_address).await? else {
                debug!(wallet = %member.wallet_address, "Member has no linked user");
                continue;
            };

            let offsets = match user.notification_preferences.reminder_times.as_slice() {
                [] => self.settings.reminder_offsets_hours.as_slice(),
                custom => custom,
            };
            for slot in reminder_slots(deadline, offsets, now) {
                let payload = json!({
                    "circleAddress": circle.circle_address,
                    "circleName": circle.metadata.name,
                    "amount": circle.deposit_amount,
                    "round": circle.current_round,
                    "deadline": deadline.to_rfc3339(),
                    "hoursLeft": slot.offset_hours,
                    "urgency": slot.urgency.as_str(),
                });
                if self
                    .schedule_notification(
                        &user.user_id,
                        NotificationType::DepositReminder,
                        &payload,
                        slot.at,
                    )
                    .await?
                    .is_some()
                {
                    scheduled += 1;
                }
            }
        }

        info!(circle = %circle_address, deadline = %deadline, scheduled, "Deposit reminders scheduled");
        Ok(scheduled)
    }

    /// Run one delivery attempt for a queued row.
    ///
    /// The row is claimed first, so concurrent callers never deliver it twice.
    pub async fn deliver(&self, id: i64) -> Result<DeliveryOutcome> {
        let max_retries = self.settings.max_retries as i32;
        let Some(row) = self.store.claim_notification(id, max_retries).await? else {
            return Ok(DeliveryOutcome::Skipped);
        };

        match self.sender.is_user_blocked(&row.user_id).await {
            Ok(true) => {
                self.store
                    .mark_notification_cancelled(row.id, "recipient blocked the bot")
                    .await?;
                info!(notification_id = row.id, user_id = %row.user_id, "Recipient blocked, notification cancelled");
                return Ok(DeliveryOutcome::Cancelled);
            }
            Ok(false) => {}
            Err(e) => return self.record_failure(&row, &e.to_string()).await,
        }

        match self
            .sender
            .send_content(&row.user_id, &row.message_content)
            .await
        {
            Ok(()) => {
                self.store.mark_notification_sent(row.id, Utc::now()).await?;
                debug!(notification_id = row.id, "Notification sent");
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => self.record_failure(&row, &e.to_string()).await,
        }
    }

    async fn record_failure(
        &self,
        row: &NotificationEvent,
        reason: &str,
    ) -> Result<DeliveryOutcome> {
        let max_retries = self.settings.max_retries as i32;
        if row.retry_count < max_retries {
            let retry_count = row.retry_count + 1;
            let next_attempt = Utc::now() + self.backoff(row.retry_count);
            self.store
                .reschedule_notification(row.id, retry_count, next_attempt, reason)
                .await?;
            warn!(
                notification_id = row.id,
                retry_count,
                next_attempt = %next_attempt,
                error = %reason,
                "Delivery failed, retry scheduled"
            );
            Ok(DeliveryOutcome::Retrying {
                retry_count,
                next_attempt,
            })
        } else {
            self.store
                .mark_notification_failed(row.id, row.retry_count, reason)
                .await?;
            error!(
                notification_id = row.id,
                retry_count = row.retry_count,
                error = %reason,
                "Delivery failed permanently"
            );
            Ok(DeliveryOutcome::Failed)
        }
    }

    /// Delay before the attempt that follows `retry_count` failures:
    /// `retry_delay * 2^retry_count`.
    pub fn backoff(&self, retry_count: i32) -> Duration {
        let factor = 1u64
            .checked_shl(retry_count.max(0) as u32)
            .unwrap_or(u64::MAX);
        let secs = self.settings.retry_delay_secs.saturating_mul(factor);
        Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64)
    }
}

fn new_notification(
    user: &User,
    kind: NotificationType,
    payload: &Value,
    at: DateTime<Utc>,
) -> NewNotification {
    NewNotification {
        notification_type: kind,
        user_id: user.user_id.clone(),
        circle_address: payload
            .get("circleAddress")
            .and_then(Value::as_str)
            .map(str::to_string),
        message_content: render(kind, payload, user.language),
        scheduled_time: at,
        metadata: payload.clone(),
    }
}
