use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use eyre::Result;
use kye_chain::{KyeEvent, Phase};
use kye_notifier::NotificationEngine;
use kye_storage::Store;
use kye_storage::models::{Circle, CircleStatus, NotificationType};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{EventContext, EventHandler, status_for_phase, to_datetime, to_i32};
use crate::contracts::format_address;

/// Turns on-chain events into user notifications.
pub struct NotificationHandler {
    store: Arc<dyn Store>,
    engine: Arc<NotificationEngine>,
}

impl NotificationHandler {
    pub fn new(store: Arc<dyn Store>, engine: Arc<NotificationEngine>) -> Self {
        Self { store, engine }
    }

    async fn notify_wallet(
        &self,
        wallet: &Address,
        kind: NotificationType,
        payload: &Value,
    ) -> Result<()> {
        let wallet = format_address(wallet);
        match self.store.get_user_by_wallet(&wallet).await? {
            Some(user) => {
                self.engine
                    .send_notification(&user.user_id, kind, payload)
                    .await?;
            }
            None => debug!(wallet = %wallet, kind = %kind, "No user linked to wallet"),
        }
        Ok(())
    }

    async fn notify_members(
        &self,
        circle: &Circle,
        kind: NotificationType,
        payload: &Value,
    ) -> Result<()> {
        for member in self.store.list_circle_members(&circle.circle_address).await? {
            let Some(user) = self.store.get_user_by_wallet(&member.wallet_address).await? else {
                continue;
            };
            if let Err(e) = self.engine.send_notification(&user.user_id, kind, payload).await {
                warn!(user_id = %user.user_id, kind = %kind, error = %e, "Member notification failed");
            }
        }
        Ok(())
    }
}

/// Common payload fields describing a circle.
fn circle_payload(circle: Option<&Circle>, address: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("circleAddress".into(), json!(address));
    if let Some(circle) = circle {
        if !circle.metadata.name.is_empty() {
            payload.insert("circleName".into(), json!(circle.metadata.name));
        }
        payload.insert("memberCount".into(), json!(circle.member_count));
        payload.insert("maxMembers".into(), json!(circle.max_members));
    }
    payload
}

fn with(mut payload: Map<String, Value>, extra: Value) -> Value {
    if let Value::Object(extra) = extra {
        payload.extend(extra);
    }
    Value::Object(payload)
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, ctx: &EventContext<'_>) -> Result<()> {
        let address = ctx.contract();
        let circle = self.store.get_circle(&address).await?;
        let base = circle_payload(circle.as_ref(), &address);

        match &ctx.log.event {
            KyeEvent::RoundStarted {
                beneficiary,
                deadline,
                ..
            } => {
                let deadline = to_datetime(*deadline)?;
                let beneficiary = format_address(beneficiary);
                self.engine
                    .schedule_deposit_reminders(&address, deadline, Some(&beneficiary))
                    .await?;
            }

            KyeEvent::DepositMade {
                member,
                round_index,
                amount,
                ..
            } => {
                let payload = with(
                    base,
                    json!({ "amount": amount.to_string(), "round": to_i32(*round_index) }),
                );
                self.notify_wallet(member, NotificationType::DepositConfirmed, &payload)
                    .await?;
            }

            KyeEvent::PayoutExecuted {
                beneficiary,
                round_index,
                amount,
            } => {
                let payload = with(
                    base,
                    json!({ "amount": amount.to_string(), "round": to_i32(*round_index) }),
                );
                self.notify_wallet(beneficiary, NotificationType::PayoutReceived, &payload)
                    .await?;
            }

            KyeEvent::PenaltyCharged {
                member,
                round_index,
                amount,
            } => {
                let payload = with(
                    base,
                    json!({ "amount": amount.to_string(), "round": to_i32(*round_index) }),
                );
                self.notify_wallet(member, NotificationType::RiskAlert, &payload)
                    .await?;
            }

            KyeEvent::MemberJoined { member, .. } => {
                let Some(circle) = circle else {
                    return Ok(());
                };
                if circle.creator_address == format_address(member) {
                    return Ok(());
                }
                let creator = match &circle.creator_id {
                    Some(id) => self.store.get_user(id).await?,
                    None => self.store.get_user_by_wallet(&circle.creator_address).await?,
                };
                if let Some(creator) = creator {
                    self.engine
                        .send_notification(
                            &creator.user_id,
                            NotificationType::MemberJoined,
                            &Value::Object(base),
                        )
                        .await?;
                }
            }

            KyeEvent::PhaseChanged { new_phase, .. } => {
                let (Some(circle), Some(phase)) = (circle, Phase::from_u8(*new_phase)) else {
                    return Ok(());
                };
                let status = status_for_phase(phase);
                let kind = match status {
                    CircleStatus::Completed => NotificationType::Celebration,
                    CircleStatus::Active => NotificationType::CircleStatus,
                    _ => return Ok(()),
                };
                let payload = with(base, json!({ "status": status.as_str() }));
                self.notify_members(&circle, kind, &payload).await?;
            }

            KyeEvent::CircleCreated { .. } => {}
        }
        Ok(())
    }
}
