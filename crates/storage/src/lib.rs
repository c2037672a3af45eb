pub mod error;
pub mod memory;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{StorageError, StoreResult};
pub use memory::MemoryStore;
pub use sqlx::Pool;
pub use sqlx::Postgres;
pub use sqlx::postgres::PgPool;
pub use store::{PgStore, Store};

use kye_core::PoolSettings;
use sqlx::postgres::PgPoolOptions;

/// Open the connection pool and apply pending migrations.
pub async fn connect(database_url: &str, pool: &PoolSettings) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(pool.max_connections)
        .min_connections(pool.min_connections)
        .acquire_timeout(pool.acquire_timeout())
        .idle_timeout(pool.idle_timeout())
        .connect(database_url)
        .await?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;
    tracing::info!(
        max_connections = pool.options().get_max_connections(),
        "Database ready"
    );
    Ok(pool)
}
