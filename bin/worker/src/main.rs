//! Kye Worker — mirrors circle contracts into PostgreSQL and delivers notifications.
//!
//! Flow:
//! 1. Connect to PostgreSQL, the chain RPC and the LINE Messaging API
//! 2. Verify the chain id, initialise the checkpoint, load monitored contracts
//! 3. Poll the chain in bounded block ranges every `SYNC_INTERVAL_SECS`
//! 4. Run the notification sweeps (due reminders, pending, retries, retention)
//!
//! Ctrl-c cancels every loop between ticks; a tick in flight runs to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use kye_chain::RpcChainClient;
use kye_core::{Settings, telemetry};
use kye_indexer::{CycleOutcome, SyncConfig, SyncEngine, default_registry};
use kye_messaging::{LineClient, LineConfig};
use kye_notifier::NotificationEngine;
use kye_storage::{self as storage, PgStore, Store};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Initialisation ──────────────────────────────────────────────────
    let settings = Settings::from_env()?;
    telemetry::init(settings.log_format);
    let config = SyncConfig::from_settings(&settings)?;

    tracing::info!(
        rpc = %settings.rpc_url,
        chain_id = settings.chain_id,
        factory = %config.factory,
        "Starting Kye worker"
    );

    let pool = storage::connect(&settings.database_url, &settings.pool).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let chain = Arc::new(RpcChainClient::connect(&settings.rpc_url)?);
    let sender = Arc::new(LineClient::new(LineConfig {
        channel_access_token: settings.line_channel_access_token.clone(),
        api_base: settings.line_api_base.clone(),
    })?);
    if !sender.is_configured() {
        tracing::warn!("LINE_CHANNEL_ACCESS_TOKEN is not set, deliveries will fail and retry");
    }
    let engine = Arc::new(NotificationEngine::new(
        store.clone(),
        sender,
        settings.notifications.clone(),
    ));

    // ── Startup protocol ────────────────────────────────────────────────
    let registry = default_registry(store.clone(), chain.clone(), engine.clone());
    let mut sync = SyncEngine::new(store, chain, registry, config);
    sync.start().await?;

    let released = engine.release_stale_claims(Utc::now()).await?;
    if released > 0 {
        tracing::warn!(count = released, "Released notifications stuck in sending");
    }

    // ── Background loops ────────────────────────────────────────────────
    let token = CancellationToken::new();
    let mut tasks = JoinSet::new();

    tasks.spawn(sync_loop(sync, settings.sync_interval(), token.clone()));

    let sweeps = &settings.sweeps;
    let e = engine.clone();
    tasks.spawn(periodic("due-reminders", sweeps.due_reminders(), token.clone(), move || {
        let e = e.clone();
        async move { e.sweep_due_reminders(Utc::now()).await.map(drop) }
    }));
    let e = engine.clone();
    tasks.spawn(periodic("pending", sweeps.pending(), token.clone(), move || {
        let e = e.clone();
        async move { e.sweep_pending(Utc::now()).await.map(drop) }
    }));
    let e = engine.clone();
    tasks.spawn(periodic("retries", sweeps.retry(), token.clone(), move || {
        let e = e.clone();
        async move { e.sweep_retries().await.map(drop) }
    }));
    let e = engine.clone();
    tasks.spawn(periodic("retention", sweeps.retention(), token.clone(), move || {
        let e = e.clone();
        async move { e.sweep_retention(Utc::now()).await.map(drop) }
    }));

    // ── Shutdown ────────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully…");
    token.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Background task panicked");
        }
    }
    pool.close().await;

    tracing::info!("Worker stopped.");
    Ok(())
}

/// Run sync cycles until cancelled. A failed cycle is logged and retried on
/// the next tick; the checkpoint only moves on success.
async fn sync_loop(mut sync: SyncEngine, period: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                match sync.run_cycle().await {
                    Ok(CycleOutcome::Scanned(report)) if report.handler_errors > 0 => {
                        tracing::warn!(
                            from = report.from_block,
                            to = report.to_block,
                            errors = report.handler_errors,
                            "Cycle finished with handler failures"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Sync cycle failed, retrying next tick"),
                }
            }
        }
    }
    tracing::info!("Sync loop stopped");
}

/// Run `tick` every `period` until cancelled.
async fn periodic<F, Fut>(name: &'static str, period: Duration, token: CancellationToken, tick: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = tick().await {
                    tracing::error!(task = name, error = %e, "Sweep failed");
                }
            }
        }
    }
    tracing::info!(task = name, "Sweep stopped");
}
