//! Side effects of decoded events, registered per event kind.

mod circle;
mod ledger;
mod notify;

pub use circle::{CircleHandler, status_for_phase};
pub use ledger::LedgerHandler;
pub use notify::NotificationHandler;

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;
use kye_chain::{DecodedLog, EventKind};

/// A decoded log plus the timestamp of its block.
#[derive(Debug, Clone)]
pub struct EventContext<'a> {
    pub log: &'a DecodedLog,
    pub timestamp: DateTime<Utc>,
}

impl EventContext<'_> {
    /// Lowercase address of the emitting contract.
    pub fn contract(&self) -> String {
        crate::contracts::format_address(&self.log.meta.contract)
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &EventContext<'_>) -> Result<()>;
}

/// Maps each event kind to its handlers, run in registration order.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    pub fn register_all(
        &mut self,
        kinds: &[EventKind],
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        for kind in kinds {
            self.register(*kind, handler.clone());
        }
        self
    }

    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Saturating conversion of on-chain integers for storage columns.
pub(crate) fn to_i32(value: U256) -> i32 {
    i32::try_from(value.saturating_to::<u64>()).unwrap_or(i32::MAX)
}

/// Unix seconds to a timestamp; out-of-range values are an error.
pub(crate) fn to_datetime(value: U256) -> Result<DateTime<Utc>> {
    let secs = i64::try_from(value.saturating_to::<u64>()).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0).ok_or_else(|| eyre::eyre!("Timestamp {value} out of range"))
}
