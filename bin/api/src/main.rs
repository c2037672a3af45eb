//! Kye API Server — chat webhook plus administrative routes over the circle data.

mod admin;
mod response;
mod webhook;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use eyre::Result;
use kye_chain::RpcChainClient;
use kye_core::{Settings, telemetry};
use kye_indexer::{SyncConfig, SyncEngine, default_registry};
use kye_messaging::{LineClient, LineConfig, MessageSender};
use kye_notifier::NotificationEngine;
use kye_storage::{self as storage, PgStore, Store};
use tokio::sync::Mutex;

/// Shared application state.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sender: Arc<dyn MessageSender>,
    pub engine: Arc<NotificationEngine>,
    /// Present when a factory is configured; used by resync and contract registration.
    pub sync: Option<Mutex<SyncEngine>>,
    pub channel_secret: String,
    pub admin_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init(settings.log_format);

    tracing::info!("Starting Kye API Server");

    let pool = storage::connect(&settings.database_url, &settings.pool).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let sender: Arc<dyn MessageSender> = Arc::new(LineClient::new(LineConfig {
        channel_access_token: settings.line_channel_access_token.clone(),
        api_base: settings.line_api_base.clone(),
    })?);
    let engine = Arc::new(NotificationEngine::new(
        store.clone(),
        sender.clone(),
        settings.notifications.clone(),
    ));

    let sync = match settings.factory_address {
        Some(_) => {
            let chain = Arc::new(RpcChainClient::connect(&settings.rpc_url)?);
            let registry = default_registry(store.clone(), chain.clone(), engine.clone());
            let sync = SyncEngine::new(
                store.clone(),
                chain,
                registry,
                SyncConfig::from_settings(&settings)?,
            );
            sync.verify_chain().await?;
            Some(Mutex::new(sync))
        }
        None => {
            tracing::warn!("FACTORY_ADDRESS is not set, resync is disabled");
            None
        }
    };
    if settings.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY is not set, admin routes are open");
    }

    let state = Arc::new(AppState {
        store,
        sender,
        engine,
        sync,
        channel_secret: settings.line_channel_secret.clone(),
        admin_key: settings.admin_api_key.clone(),
    });

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.api_port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await?;

    pool.close().await;
    tracing::info!("API server stopped.");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/resync", post(admin::resync))
        .route("/stats/notifications", get(admin::notification_stats))
        .route("/stats/circles", get(admin::circle_stats))
        .route(
            "/notifications",
            get(admin::list_notifications).post(admin::send_notification),
        )
        .route("/circles/:address/group", put(admin::set_circle_group))
        .route("/groups/:group_id/circles", get(admin::group_circles))
        .route(
            "/contracts",
            get(admin::list_contracts).post(admin::add_contract),
        )
        .route("/contracts/:address", delete(admin::remove_contract))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin_key,
        ));

    Router::new()
        .route("/webhook", post(webhook::webhook))
        .nest("/admin", admin)
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
