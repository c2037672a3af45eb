//! Chain sync engine: polls the circle contracts, records every event once
//! and fans it out to the state, ledger and notification handlers.

pub mod contracts;
pub mod handlers;
pub mod sync;

use std::sync::Arc;

use kye_chain::{ChainClient, EventKind};
use kye_notifier::NotificationEngine;
use kye_storage::Store;

pub use contracts::{MonitoredContracts, format_address, parse_address};
pub use handlers::{
    CircleHandler, EventContext, EventHandler, HandlerRegistry, LedgerHandler,
    NotificationHandler, status_for_phase,
};
pub use sync::{CycleOutcome, ScanReport, SyncConfig, SyncEngine};

/// Handlers of every tracked event. State is written before anyone is
/// notified about it.
pub fn default_registry(
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    engine: Arc<NotificationEngine>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_all(
            &[
                EventKind::CircleCreated,
                EventKind::MemberJoined,
                EventKind::RoundStarted,
                EventKind::PhaseChanged,
            ],
            Arc::new(CircleHandler::new(store.clone(), chain)),
        )
        .register_all(
            &[
                EventKind::DepositMade,
                EventKind::PayoutExecuted,
                EventKind::PenaltyCharged,
            ],
            Arc::new(LedgerHandler::new(store.clone())),
        )
        .register_all(
            &[
                EventKind::MemberJoined,
                EventKind::RoundStarted,
                EventKind::DepositMade,
                EventKind::PayoutExecuted,
                EventKind::PenaltyCharged,
                EventKind::PhaseChanged,
            ],
            Arc::new(NotificationHandler::new(store, engine)),
        );
    registry
}
