use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use kye_chain::{ChainClient, KyeEvent, Phase};
use kye_storage::Store;
use kye_storage::models::{CircleMember, CircleMetadata, CircleStatus, NewCircle};
use tracing::{debug, info, warn};

use super::{EventContext, EventHandler, to_datetime, to_i32};
use crate::contracts::format_address;

/// Local status of a circle in the given on-chain phase.
pub fn status_for_phase(phase: Phase) -> CircleStatus {
    match phase {
        Phase::Setup | Phase::Recruiting => CircleStatus::Setup,
        Phase::Active => CircleStatus::Active,
        Phase::Settling | Phase::Completed => CircleStatus::Completed,
        Phase::Disputed => CircleStatus::Disputed,
    }
}

/// Mirrors circle state: creation, membership, rounds and phase.
pub struct CircleHandler {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
}

impl CircleHandler {
    pub fn new(store: Arc<dyn Store>, chain: Arc<dyn ChainClient>) -> Self {
        Self { store, chain }
    }
}

#[async_trait]
impl EventHandler for CircleHandler {
    fn name(&self) -> &'static str {
        "circle"
    }

    async fn handle(&self, ctx: &EventContext<'_>) -> Result<()> {
        match &ctx.log.event {
            KyeEvent::CircleCreated {
                creator,
                circle,
                group_id_hash,
                deposit_amount,
            } => {
                let params = match self.chain.circle_params(*circle).await {
                    Ok(params) => params,
                    Err(e) => {
                        warn!(circle = %circle, error = %e, "Circle parameters unavailable, using defaults");
                        Default::default()
                    }
                };
                let creator_address = format_address(creator);
                let creator_id = self
                    .store
                    .get_user_by_wallet(&creator_address)
                    .await?
                    .map(|u| u.user_id);

                let new_circle = NewCircle {
                    circle_address: format_address(circle),
                    group_id_hash: format!("{group_id_hash:#x}"),
                    creator_id,
                    creator_address,
                    max_members: i32::try_from(params.max_members).unwrap_or(i32::MAX),
                    deposit_amount: deposit_amount.to_string(),
                    created_at: ctx.timestamp,
                    metadata: CircleMetadata {
                        name: params.name,
                        round_duration_days: (params.round_duration_secs / 86_400) as u32,
                        penalty_bps: params.penalty_bps,
                        ..Default::default()
                    },
                };
                if self.store.insert_circle(&new_circle).await? {
                    info!(circle = %new_circle.circle_address, deposit = %new_circle.deposit_amount, "Circle created");
                } else {
                    debug!(circle = %new_circle.circle_address, "Circle already stored");
                }
            }

            KyeEvent::MemberJoined {
                member,
                user_id_hash,
            } => {
                let circle = ctx.contract();
                let count = self
                    .store
                    .add_circle_member(&CircleMember {
                        circle_address: circle.clone(),
                        wallet_address: format_address(member),
                        user_id_hash: format!("{user_id_hash:#x}"),
                        joined_at: ctx.timestamp,
                    })
                    .await?;
                info!(circle = %circle, member = %member, members = count, "Member joined");
            }

            KyeEvent::RoundStarted {
                round_index,
                deadline,
                ..
            } => {
                let circle = ctx.contract();
                let round = to_i32(*round_index);
                let deadline = to_datetime(*deadline)?;
                if self.store.update_circle_round(&circle, round, deadline).await? {
                    info!(circle = %circle, round, deadline = %deadline, "Round started");
                } else {
                    warn!(circle = %circle, round, "Round update ignored (unknown circle or older round)");
                }
            }

            KyeEvent::PhaseChanged { new_phase, .. } => {
                let circle = ctx.contract();
                let Some(phase) = Phase::from_u8(*new_phase) else {
                    warn!(circle = %circle, phase = new_phase, "Unknown circle phase");
                    return Ok(());
                };
                let status = status_for_phase(phase);
                if self.store.update_circle_status(&circle, status).await? {
                    info!(circle = %circle, status = %status, "Circle status changed");
                } else {
                    warn!(circle = %circle, "Status change for unknown circle");
                }
            }

            _ => {}
        }
        Ok(())
    }
}
