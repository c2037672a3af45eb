use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use alloy::primitives::Address;
use eyre::Result;
use kye_chain::{ChainClient, DecodedLog, KyeEvent, decode_factory_log, decode_group_log};
use kye_core::{AppError, Settings};
use kye_storage::Store;
use kye_storage::models::{EventRecordState, NewBlockchainEvent};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::contracts::{MonitoredContracts, format_address, parse_address};
use crate::handlers::{EventContext, HandlerRegistry};

/// A dispatch claim older than this is taken to be abandoned by a crashed scanner.
pub const DISPATCH_CLAIM_TIMEOUT_MINUTES: i64 = 10;

/// Chain-facing parameters of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub chain_id: u64,
    pub factory: Address,
    /// First block to scan when no checkpoint exists; otherwise the head.
    pub start_block: Option<u64>,
    pub max_block_range: u64,
}

impl SyncConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let raw = settings.require_factory_address()?;
        let factory = parse_address(raw)
            .ok_or_else(|| AppError::Config(format!("FACTORY_ADDRESS is not an address: {raw}")))?;
        Ok(Self {
            chain_id: settings.chain_id,
            factory,
            start_block: settings.start_block,
            max_block_range: settings.max_block_range.max(1),
        })
    }
}

/// Counters of one scanned block range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub from_block: u64,
    pub to_block: u64,
    pub contracts_scanned: usize,
    pub logs: usize,
    /// Events seen for the first time.
    pub inserted: usize,
    /// Events whose handlers ran in this scan.
    pub dispatched: usize,
    /// Events already handled by an earlier scan.
    pub duplicates: usize,
    /// Events another scanner is dispatching right now.
    pub in_flight: usize,
    pub decode_errors: usize,
    pub handler_errors: usize,
    pub new_contracts: usize,
}

impl ScanReport {
    fn merge(&mut self, other: &ScanReport) {
        self.to_block = other.to_block;
        self.contracts_scanned += other.contracts_scanned;
        self.logs += other.logs;
        self.inserted += other.inserted;
        self.dispatched += other.dispatched;
        self.duplicates += other.duplicates;
        self.in_flight += other.in_flight;
        self.decode_errors += other.decode_errors;
        self.handler_errors += other.handler_errors;
        self.new_contracts += other.new_contracts;
    }
}

/// Outcome of one steady-state cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The checkpoint is already at the head.
    Idle { head: u64 },
    Scanned(ScanReport),
}

/// Polls the chain, mirrors circle events into the store and drives handlers.
pub struct SyncEngine {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    registry: HandlerRegistry,
    contracts: MonitoredContracts,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        registry: HandlerRegistry,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            chain,
            registry,
            contracts: MonitoredContracts::new(config.factory),
            config,
        }
    }

    pub fn contracts(&self) -> &MonitoredContracts {
        &self.contracts
    }

    /// Startup protocol: check the network, make sure a checkpoint exists and
    /// load the monitored contracts. Returns the checkpoint to resume from.
    pub async fn start(&mut self) -> Result<u64> {
        let head = self.verify_chain().await?;
        let checkpoint = self.init_checkpoint(head).await?;
        self.load_contracts().await?;
        info!(
            checkpoint,
            head,
            contracts = self.contracts.len(),
            "Sync engine ready"
        );
        Ok(checkpoint)
    }

    /// Fails when the node serves another chain. Returns the current head.
    pub async fn verify_chain(&self) -> Result<u64> {
        let actual = self.chain.chain_id().await?;
        if actual != self.config.chain_id {
            return Err(AppError::ChainIdMismatch {
                expected: self.config.chain_id,
                actual,
            }
            .into());
        }
        let head = self.chain.block_number().await?;
        info!(chain_id = actual, head, "Connected to chain");
        Ok(head)
    }

    /// Initialise a missing checkpoint to the head (or just before
    /// `start_block`) and persist it.
    pub async fn init_checkpoint(&self, head: u64) -> Result<u64> {
        match self.store.get_checkpoint().await? {
            Some(checkpoint) if checkpoint > 0 => Ok(checkpoint),
            _ => {
                let checkpoint = match self.config.start_block {
                    Some(start) => start.saturating_sub(1),
                    None => head,
                };
                self.store.set_checkpoint(checkpoint).await?;
                info!(checkpoint, "Checkpoint initialised");
                Ok(checkpoint)
            }
        }
    }

    /// Rebuild the monitored set from the factory, persisted contracts and
    /// active circles.
    pub async fn load_contracts(&mut self) -> Result<()> {
        let stored = self.store.list_monitored_contracts().await?;
        let active = self.store.get_active_circles().await?;
        self.contracts = MonitoredContracts::seed(
            self.config.factory,
            stored.iter().map(String::as_str),
            active.iter().map(|c| c.circle_address.as_str()),
        );
        Ok(())
    }

    /// Register a contract for scanning. Returns `true` when it is new.
    pub async fn add_contract(&mut self, address: Address) -> Result<bool> {
        self.store
            .add_monitored_contract(&format_address(&address))
            .await?;
        Ok(self.contracts.insert(address))
    }

    pub async fn remove_contract(&mut self, address: &Address) -> Result<bool> {
        let removed = self
            .store
            .remove_monitored_contract(&format_address(address))
            .await?;
        Ok(self.contracts.remove(address) || removed)
    }

    /// One steady-state cycle: scan `[checkpoint + 1, min(head, checkpoint + range)]`
    /// across every monitored contract, then advance the checkpoint.
    ///
    /// Any fetch failure aborts the cycle and leaves the checkpoint untouched.
    /// The monitored set is reloaded first so contracts registered by other
    /// processes are picked up.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.load_contracts().await?;
        let checkpoint = self.store.get_checkpoint().await?.unwrap_or(0);
        let head = self.chain.block_number().await?;
        if head <= checkpoint {
            debug!(checkpoint, head, "Caught up");
            return Ok(CycleOutcome::Idle { head });
        }

        let from = checkpoint + 1;
        let to = head.min(checkpoint.saturating_add(self.config.max_block_range));
        let report = self.scan_range(from, to).await?;
        self.store.set_checkpoint(to).await?;

        info!(
            from,
            to,
            head,
            logs = report.logs,
            inserted = report.inserted,
            "Sync cycle complete"
        );
        Ok(CycleOutcome::Scanned(report))
    }

    /// Re-scan an explicit range in windows of at most `max_block_range`
    /// blocks. The checkpoint is not moved.
    ///
    /// Defaults: `from = checkpoint - max_block_range + 1`, `to = head`.
    pub async fn resync(&mut self, from: Option<u64>, to: Option<u64>) -> Result<ScanReport> {
        self.load_contracts().await?;
        let range = self.config.max_block_range;
        let from = match from {
            Some(from) => from,
            None => {
                let checkpoint = self.store.get_checkpoint().await?.unwrap_or(0);
                (checkpoint + 1).saturating_sub(range).max(1)
            }
        };
        let to = match to {
            Some(to) => to,
            None => self.chain.block_number().await?,
        };
        if from > to {
            return Err(AppError::Validation(format!(
                "fromBlock {from} is after toBlock {to}"
            ))
            .into());
        }

        info!(from, to, "Manual resync started");
        let mut total = ScanReport {
            from_block: from,
            to_block: from,
            ..Default::default()
        };
        let mut start = from;
        while start <= to {
            let end = to.min(start.saturating_add(range - 1));
            let window = self.scan_range(start, end).await?;
            total.merge(&window);
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        info!(
            from,
            to,
            inserted = total.inserted,
            dispatched = total.dispatched,
            "Manual resync finished"
        );
        Ok(total)
    }

    /// Scan `[from, to]` for every monitored contract, including contracts
    /// discovered while scanning.
    pub async fn scan_range(&mut self, from: u64, to: u64) -> Result<ScanReport> {
        let mut report = ScanReport {
            from_block: from,
            to_block: to,
            ..Default::default()
        };
        let mut queue: VecDeque<Address> = self.contracts.iter().collect();
        let mut scanned = BTreeSet::new();

        while let Some(address) = queue.pop_front() {
            if !scanned.insert(address) {
                continue;
            }
            report.contracts_scanned += 1;

            let logs = self.chain.get_logs(address, from, to).await.map_err(|e| {
                error!(address = %address, from, to, error = %e, "Log fetch failed");
                e
            })?;
            report.logs += logs.len();

            let is_factory = self.contracts.is_factory(&address);
            for log in &logs {
                let decoded = if is_factory {
                    decode_factory_log(log)
                } else {
                    decode_group_log(log)
                };
                let decoded = match decoded {
                    Ok(Some(decoded)) => decoded,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(address = %address, tx = ?log.transaction_hash, error = %e, "Skipping undecodable log");
                        report.decode_errors += 1;
                        continue;
                    }
                };

                if let Some(discovered) = self.process(&decoded, &mut report).await? {
                    report.new_contracts += 1;
                    queue.push_back(discovered);
                }
            }
        }

        Ok(report)
    }

    /// Record one event and run its handlers if it was not handled before.
    /// Returns a newly discovered circle contract.
    async fn process(
        &mut self,
        decoded: &DecodedLog,
        report: &mut ScanReport,
    ) -> Result<Option<Address>> {
        let meta = &decoded.meta;
        let timestamp = match meta
            .block_timestamp
            .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
        {
            Some(ts) => ts,
            None => self.chain.block_timestamp(meta.block_number).await?,
        };

        let kind = decoded.event.kind();
        let record = NewBlockchainEvent {
            event_name: kind.name().to_string(),
            contract_address: format_address(&meta.contract),
            block_number: i64::try_from(meta.block_number).unwrap_or(i64::MAX),
            log_index: i32::try_from(meta.log_index).unwrap_or(i32::MAX),
            transaction_hash: meta.transaction_hash.clone(),
            args: decoded.event.args(),
            timestamp,
        };
        let stale_before =
            chrono::Utc::now() - chrono::Duration::minutes(DISPATCH_CLAIM_TIMEOUT_MINUTES);
        let state = self.store.record_event(&record, stale_before).await?;

        let discovered = match &decoded.event {
            KyeEvent::CircleCreated { circle, .. } => {
                let circle = *circle;
                self.add_contract(circle).await?.then_some(circle)
            }
            _ => None,
        };

        match state {
            EventRecordState::Handled => {
                report.duplicates += 1;
                return Ok(discovered);
            }
            EventRecordState::InFlight => {
                debug!(event = %kind, tx = %meta.transaction_hash, "Event claimed by another scanner");
                report.in_flight += 1;
                return Ok(discovered);
            }
            EventRecordState::Inserted | EventRecordState::Unhandled => {}
        }
        report.inserted += usize::from(state == EventRecordState::Inserted);

        let ctx = EventContext {
            log: decoded,
            timestamp,
        };
        for handler in self.registry.handlers_for(kind) {
            if let Err(e) = handler.handle(&ctx).await {
                report.handler_errors += 1;
                error!(
                    handler = handler.name(),
                    event = %kind,
                    tx = %meta.transaction_hash,
                    error = %e,
                    "Event handler failed"
                );
            }
        }
        self.store.mark_event_handled(&record.key()).await?;
        report.dispatched += 1;
        debug!(event = %kind, block = meta.block_number, tx = %meta.transaction_hash, "Event dispatched");

        Ok(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_registry;
    use crate::testing::FakeChain;
    use crate::handlers::EventHandler;
    use alloy::primitives::{B256, U256};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use kye_chain::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use kye_chain::{CircleParams, KyeFactory, KyeGroup};
    use kye_core::NotificationSettings;
    use kye_messaging::RecordingSender;
    use kye_notifier::NotificationEngine;
    use kye_storage::MemoryStore;
    use kye_storage::models::{CircleStatus, Ledger, NewUser, NotificationType};

    const CHAIN_ID: u64 = 1001;

    fn factory() -> Address {
        Address::repeat_byte(0xf0)
    }

    fn circle() -> Address {
        Address::repeat_byte(0xc1)
    }

    fn wallet(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        chain: Arc<FakeChain>,
        sender: Arc<RecordingSender>,
        sync: SyncEngine,
    }

    fn fixture(chain: FakeChain, start_block: Option<u64>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(chain);
        let sender = Arc::new(RecordingSender::new());
        let engine = Arc::new(NotificationEngine::new(
            store.clone(),
            sender.clone(),
            NotificationSettings::default(),
        ));
        let registry = default_registry(store.clone(), chain.clone(), engine);
        let sync = SyncEngine::new(
            store.clone(),
            chain.clone(),
            registry,
            SyncConfig {
                chain_id: CHAIN_ID,
                factory: factory(),
                start_block,
                max_block_range: 100,
            },
        );
        Fixture {
            store,
            chain,
            sender,
            sync,
        }
    }

    async fn link(store: &MemoryStore, user_id: &str, byte: u8) {
        store
            .upsert_user(&NewUser {
                user_id: user_id.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .set_user_wallet(user_id, Some(&format_address(&wallet(byte))))
            .await
            .unwrap();
    }

    /// Circle created by 0xaa.. at block 5, joined by 0xbb.. and 0xcc..
    fn emit_circle(chain: &FakeChain) {
        chain.set_params(
            circle(),
            CircleParams {
                name: "Family".into(),
                max_members: 3,
                ..Default::default()
            },
        );
        chain.emit(
            factory(),
            KyeFactory::CircleCreated {
                creator: wallet(0xaa),
                circleAddress: circle(),
                groupIdHash: B256::repeat_byte(0x11),
                depositAmount: U256::from(100_000_000u64),
            },
            5,
        );
        for (byte, block) in [(0xbb, 6), (0xcc, 7)] {
            chain.emit(
                circle(),
                KyeGroup::MemberJoined {
                    member: wallet(byte),
                    userIdHash: B256::repeat_byte(byte),
                },
                block,
            );
        }
    }

    fn scanned(outcome: CycleOutcome) -> ScanReport {
        match outcome {
            CycleOutcome::Scanned(report) => report,
            other => panic!("expected a scan, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_chain_is_fatal() {
        let mut f = fixture(FakeChain::new(1, 50), None);
        let err = f.sync.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::ChainIdMismatch {
                expected: CHAIN_ID,
                actual: 1
            })
        ));
        assert_eq!(f.store.get_checkpoint().await.unwrap(), None);
    }

    #[tokio::test]
    async fn fresh_checkpoint_starts_at_head_or_start_block() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 50), None);
        assert_eq!(f.sync.start().await.unwrap(), 50);

        let mut f = fixture(FakeChain::new(CHAIN_ID, 50), Some(10));
        assert_eq!(f.sync.start().await.unwrap(), 9);
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn startup_loads_stored_and_active_contracts() {
        let f = fixture(FakeChain::new(CHAIN_ID, 50), None);
        let stored = wallet(0x01);
        f.store
            .add_monitored_contract(&format_address(&stored))
            .await
            .unwrap();
        let mut sync = f.sync;
        sync.start().await.unwrap();
        assert!(sync.contracts().contains(&factory()));
        assert!(sync.contracts().contains(&stored));
        assert_eq!(sync.contracts().len(), 2);
    }

    #[tokio::test]
    async fn created_circle_is_mirrored_and_scanned_in_the_same_cycle() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        emit_circle(&f.chain);
        f.sync.start().await.unwrap();

        let report = scanned(f.sync.run_cycle().await.unwrap());
        assert_eq!(report.new_contracts, 1);
        assert_eq!(report.inserted, 3);
        assert!(f.chain.log_calls().contains(&(circle(), 1, 20)));

        let address = format_address(&circle());
        let stored = f.store.get_circle(&address).await.unwrap().unwrap();
        assert_eq!(stored.status, CircleStatus::Setup);
        assert_eq!(stored.max_members, 3);
        assert_eq!(stored.metadata.name, "Family");
        assert_eq!(stored.member_count, 3);
        assert!(f.sync.contracts().contains(&circle()));
        assert!(
            f.store
                .list_monitored_contracts()
                .await
                .unwrap()
                .contains(&address)
        );
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn missing_circle_params_fall_back_to_defaults() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        f.chain.emit(
            factory(),
            KyeFactory::CircleCreated {
                creator: wallet(0xaa),
                circleAddress: circle(),
                groupIdHash: B256::ZERO,
                depositAmount: U256::from(5u64),
            },
            3,
        );
        f.sync.start().await.unwrap();
        f.sync.run_cycle().await.unwrap();

        let stored = f
            .store
            .get_circle(&format_address(&circle()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.max_members, 10);
        assert_eq!(stored.member_count, 1);
    }

    #[tokio::test]
    async fn rescanning_has_no_duplicate_effects() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        link(&f.store, "UA", 0xaa).await;
        link(&f.store, "UB", 0xbb).await;
        emit_circle(&f.chain);
        f.chain.emit(
            circle(),
            KyeGroup::DepositMade {
                member: wallet(0xbb),
                roundIndex: U256::from(1u64),
                amount: U256::from(100_000_000u64),
                penalty: U256::ZERO,
            },
            9,
        );
        f.sync.start().await.unwrap();
        f.sync.run_cycle().await.unwrap();

        let events = f.store.events().len();
        let sent = f.sender.sent().len();
        let deposits = f.store.ledger_entries(Ledger::Deposits).len();
        assert_eq!(events, 4);
        assert_eq!(deposits, 1);
        // Two joins reported to the creator, one deposit confirmation.
        assert_eq!(sent, 3);

        let report = f.sync.resync(Some(1), Some(20)).await.unwrap();
        assert_eq!(report.duplicates, 4);
        assert_eq!(report.dispatched, 0);
        assert_eq!(f.store.events().len(), events);
        assert_eq!(f.sender.sent().len(), sent);
        assert_eq!(f.store.ledger_entries(Ledger::Deposits).len(), deposits);
        assert_eq!(
            f.store
                .get_circle(&format_address(&circle()))
                .await
                .unwrap()
                .unwrap()
                .member_count,
            3
        );
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_checkpoint() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        f.sync.start().await.unwrap();
        f.chain.fail_logs(true);

        assert!(f.sync.run_cycle().await.is_err());
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(0));

        f.chain.fail_logs(false);
        f.sync.run_cycle().await.unwrap();
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn cycle_range_is_bounded() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 1_000), Some(1));
        f.sync.start().await.unwrap();

        let report = scanned(f.sync.run_cycle().await.unwrap());
        assert_eq!((report.from_block, report.to_block), (1, 100));
        assert_eq!(f.chain.log_calls(), vec![(factory(), 1, 100)]);
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(100));

        scanned(f.sync.run_cycle().await.unwrap());
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(200));
    }

    #[tokio::test]
    async fn caught_up_cycle_is_idle() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), None);
        f.sync.start().await.unwrap();
        assert_eq!(
            f.sync.run_cycle().await.unwrap(),
            CycleOutcome::Idle { head: 20 }
        );

        f.chain.set_head(25);
        let report = scanned(f.sync.run_cycle().await.unwrap());
        assert_eq!((report.from_block, report.to_block), (21, 25));
    }

    #[tokio::test]
    async fn round_start_schedules_reminders_for_everyone_but_the_beneficiary() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        link(&f.store, "UA", 0xaa).await;
        link(&f.store, "UB", 0xbb).await;
        link(&f.store, "UC", 0xcc).await;
        emit_circle(&f.chain);
        let deadline = Utc::now() + Duration::hours(72);
        f.chain.emit(
            circle(),
            KyeGroup::RoundStarted {
                roundIndex: U256::from(1u64),
                beneficiary: wallet(0xaa),
                deadline: U256::from(deadline.timestamp() as u64),
            },
            10,
        );
        f.sync.start().await.unwrap();
        f.sync.run_cycle().await.unwrap();

        let reminders: Vec<_> = f
            .store
            .notifications()
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::DepositReminder)
            .collect();
        assert_eq!(reminders.len(), 8);
        assert!(reminders.iter().all(|n| n.user_id != "UA"));

        let stored = f
            .store
            .get_circle(&format_address(&circle()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_round, 1);
        assert_eq!(
            stored.next_deadline.map(|d| d.timestamp()),
            Some(deadline.timestamp())
        );
    }

    #[tokio::test]
    async fn resync_rejects_inverted_ranges() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), None);
        f.sync.start().await.unwrap();
        let err = f.sync.resync(Some(10), Some(5)).await.unwrap_err();
        assert!(
            err.downcast_ref::<AppError>()
                .is_some_and(AppError::is_validation)
        );
    }

    #[tokio::test]
    async fn resync_walks_windows_without_moving_the_checkpoint() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 250), None);
        f.sync.start().await.unwrap();

        let report = f.sync.resync(Some(1), Some(250)).await.unwrap();
        assert_eq!((report.from_block, report.to_block), (1, 250));
        assert_eq!(
            f.chain.log_calls(),
            vec![(factory(), 1, 100), (factory(), 101, 200), (factory(), 201, 250)]
        );
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(250));
    }

    #[tokio::test]
    async fn removed_contract_is_no_longer_scanned() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        f.sync.start().await.unwrap();
        assert!(f.sync.add_contract(circle()).await.unwrap());
        assert!(!f.sync.add_contract(circle()).await.unwrap());
        assert!(f.sync.remove_contract(&circle()).await.unwrap());

        f.sync.run_cycle().await.unwrap();
        assert!(f.chain.log_calls().iter().all(|(a, _, _)| *a == factory()));
    }

    /// Counts its invocations, yielding first so a concurrent scanner can run.
    #[derive(Default)]
    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _ctx: &EventContext<'_>) -> Result<()> {
            tokio::task::yield_now().await;
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _ctx: &EventContext<'_>) -> Result<()> {
            Err(eyre::eyre!("handler exploded"))
        }
    }

    fn engine_with(
        store: &Arc<MemoryStore>,
        chain: &Arc<FakeChain>,
        registry: HandlerRegistry,
    ) -> SyncEngine {
        SyncEngine::new(
            store.clone(),
            chain.clone(),
            registry,
            SyncConfig {
                chain_id: CHAIN_ID,
                factory: factory(),
                start_block: Some(1),
                max_block_range: 100,
            },
        )
    }

    #[tokio::test]
    async fn concurrent_scanners_dispatch_each_event_once() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(FakeChain::new(CHAIN_ID, 20));
        chain.emit(
            factory(),
            KyeFactory::CircleCreated {
                creator: wallet(0xaa),
                circleAddress: circle(),
                groupIdHash: B256::ZERO,
                depositAmount: U256::from(5u64),
            },
            5,
        );
        let counter = Arc::new(CountingHandler::default());
        let mut registry = HandlerRegistry::new();
        registry.register(EventKind::CircleCreated, counter.clone());

        let mut worker = engine_with(&store, &chain, registry.clone());
        let mut api = engine_with(&store, &chain, registry);
        worker.start().await.unwrap();

        let (cycle, resync) = tokio::join!(worker.run_cycle(), api.resync(Some(1), Some(20)));
        let cycle = scanned(cycle.unwrap());
        let resync = resync.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(cycle.dispatched + resync.dispatched, 1);
        assert_eq!(cycle.in_flight + resync.in_flight, 1);
        assert_eq!(store.count_events().await.unwrap(), 1);
        assert_eq!(store.get_checkpoint().await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn undecodable_log_is_skipped_and_the_cycle_completes() {
        let mut f = fixture(FakeChain::new(CHAIN_ID, 20), Some(1));
        f.chain.emit_truncated(
            circle(),
            KyeGroup::PhaseChanged {
                oldPhase: 0,
                newPhase: 1,
            },
            5,
        );
        emit_circle(&f.chain);
        f.sync.start().await.unwrap();

        let report = scanned(f.sync.run_cycle().await.unwrap());
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.inserted, 3);
        assert_eq!(f.store.count_events().await.unwrap(), 3);
        let stored = f
            .store
            .get_circle(&format_address(&circle()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.member_count, 3);
        assert_eq!(stored.status, CircleStatus::Setup);
        assert_eq!(f.store.get_checkpoint().await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(FakeChain::new(CHAIN_ID, 20));
        emit_circle(&chain);
        let counter = Arc::new(CountingHandler::default());
        let mut registry = HandlerRegistry::new();
        registry
            .register(EventKind::MemberJoined, Arc::new(FailingHandler))
            .register(EventKind::MemberJoined, counter.clone());

        let mut sync = engine_with(&store, &chain, registry);
        sync.start().await.unwrap();
        let report = scanned(sync.run_cycle().await.unwrap());
        assert_eq!(report.handler_errors, 2);
        assert_eq!(report.dispatched, 3);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert_eq!(store.get_checkpoint().await.unwrap(), Some(20));

        // failed events are still marked handled
        let again = sync.resync(Some(1), Some(20)).await.unwrap();
        assert_eq!(again.dispatched, 0);
        assert_eq!(again.duplicates, 3);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
