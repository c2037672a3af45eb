use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use eyre::Result;
use kye_chain::KyeEvent;
use kye_storage::Store;
use kye_storage::models::{Ledger, LedgerEntry};
use tracing::debug;

use super::{EventContext, EventHandler, to_i32};
use crate::contracts::format_address;

/// Appends deposits, payouts and penalties to their audit tables.
pub struct LedgerHandler {
    store: Arc<dyn Store>,
}

impl LedgerHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for LedgerHandler {
    fn name(&self) -> &'static str {
        "ledger"
    }

    async fn handle(&self, ctx: &EventContext<'_>) -> Result<()> {
        let (ledger, member, round_index, amount, penalty) = match &ctx.log.event {
            KyeEvent::DepositMade {
                member,
                round_index,
                amount,
                penalty,
            } => (Ledger::Deposits, member, round_index, amount, *penalty),
            KyeEvent::PayoutExecuted {
                beneficiary,
                round_index,
                amount,
            } => (Ledger::Payouts, beneficiary, round_index, amount, U256::ZERO),
            KyeEvent::PenaltyCharged {
                member,
                round_index,
                amount,
            } => (Ledger::Penalties, member, round_index, amount, U256::ZERO),
            _ => return Ok(()),
        };

        let entry = entry(ctx, member, *round_index, *amount, penalty);
        self.store.insert_ledger_entry(ledger, &entry).await?;
        debug!(
            ledger = ledger.table(),
            circle = %entry.circle_address,
            member = %entry.member_address,
            round = entry.round_index,
            "Ledger entry recorded"
        );
        Ok(())
    }
}

fn entry(
    ctx: &EventContext<'_>,
    member: &Address,
    round_index: U256,
    amount: U256,
    penalty: U256,
) -> LedgerEntry {
    LedgerEntry {
        circle_address: ctx.contract(),
        round_index: to_i32(round_index),
        member_address: format_address(member),
        amount: amount.to_string(),
        penalty: penalty.to_string(),
        transaction_hash: ctx.log.meta.transaction_hash.clone(),
        block_number: i64::try_from(ctx.log.meta.block_number).unwrap_or(i64::MAX),
    }
}
