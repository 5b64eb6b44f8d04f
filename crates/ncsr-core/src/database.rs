use diesel::Connection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, AppResult};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const POOL_SIZE: u32 = 10;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection pool shared by every top-level operation. Sessions are checked
/// out one per operation and never cross task boundaries.
pub type DatabasePool = Pool<AsyncPgConnection>;

/// A connection checked out of the pool
pub type PooledConn<'a> = PooledConnection<'a, AsyncPgConnection>;

/// Build the bb8 pool for the configured database
pub async fn create_pool(database_url: &str) -> AppResult<DatabasePool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);

    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .connection_timeout(CHECKOUT_TIMEOUT)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .build(manager)
        .await
        .map_err(|e| AppError::ConnectionPool(e.to_string()))?;

    info!(max_size = POOL_SIZE, "Database pool ready");
    Ok(pool)
}

/// Round-trip a trivial query to prove the database is reachable before any
/// work is scheduled
pub async fn test_connection(pool: &DatabasePool) -> AppResult<()> {
    use diesel::sql_types::Integer;

    let mut conn = pool.get().await?;

    let one: i32 = diesel_async::RunQueryDsl::get_result(
        diesel::select(diesel::dsl::sql::<Integer>("1")),
        &mut conn,
    )
    .await
    .map_err(|e| AppError::ConnectionPool(format!("connectivity probe failed: {}", e)))?;

    if one != 1 {
        return Err(AppError::internal_error(
            "connectivity probe returned an unexpected row",
        ));
    }
    Ok(())
}

/// Apply any pending migrations. Diesel migrations want a synchronous
/// connection, so the work hops onto the blocking thread pool.
pub async fn run_migrations(database_url: &str) -> AppResult<()> {
    let url = database_url.to_string();

    let applied = tokio::task::spawn_blocking(move || -> AppResult<usize> {
        let mut conn = diesel::PgConnection::establish(&url).map_err(|e| {
            AppError::MigrationError(format!("cannot open migration connection: {}", e))
        })?;

        let versions = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| AppError::MigrationError(e.to_string()))?;

        Ok(versions.len())
    })
    .await
    .map_err(|e| AppError::internal_error(format!("migration worker panicked: {}", e)))??;

    info!(applied, "Schema migrations up to date");
    Ok(())
}
