//! Notification engine: renders typed requests into localized messages,
//! queues them durably and delivers them with bounded, backed-off retries.

pub mod engine;
pub mod i18n;
pub mod preferences;
pub mod reminders;
pub mod sweeps;
pub mod templates;

pub use engine::{DeliveryOutcome, NotificationEngine};
pub use preferences::should_send;
pub use reminders::{ReminderSlot, Urgency, reminder_slots};
pub use sweeps::SweepReport;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use kye_core::NotificationSettings;
    use kye_messaging::RecordingSender;
    use kye_storage::models::{CircleMember, CircleMetadata, NewCircle, NewUser};
    use kye_storage::{MemoryStore, Store};

    use crate::NotificationEngine;

    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub sender: Arc<RecordingSender>,
        pub engine: NotificationEngine,
    }

    pub fn harness() -> Harness {
        harness_with(NotificationSettings::default())
    }

    pub fn harness_with(settings: NotificationSettings) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let engine = NotificationEngine::new(store.clone(), sender.clone(), settings);
        Harness {
            store,
            sender,
            engine,
        }
    }

    /// Create a user and link `wallet` to it.
    pub async fn user(store: &MemoryStore, user_id: &str, wallet: &str) {
        store
            .upsert_user(&NewUser {
                user_id: user_id.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.set_user_wallet(user_id, Some(wallet)).await.unwrap();
    }

    /// A circle created by `members[0]` with every wallet as a member.
    pub async fn circle(store: &MemoryStore, address: &str, members: &[&str]) {
        store
            .insert_circle(&NewCircle {
                circle_address: address.into(),
                group_id_hash: "0xgroup".into(),
                creator_id: None,
                creator_address: members[0].into(),
                max_members: 10,
                deposit_amount: "100000000".into(),
                created_at: Utc::now(),
                metadata: CircleMetadata {
                    name: "Family".into(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        for wallet in &members[1..] {
            store
                .add_circle_member(&CircleMember {
                    circle_address: address.into(),
                    wallet_address: (*wallet).into(),
                    user_id_hash: "0xhash".into(),
                    joined_at: Utc::now(),
                })
                .await
                .unwrap();
        }
    }
}
