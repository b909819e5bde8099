pub mod journal;
pub mod ledger;
pub mod matcher;
pub mod orders;
pub mod registry;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Thin wrapper around the connection pool. The implementation is split across several modules,
/// one per owning component (`ledger`, `orders`, `matcher`, `journal`, `registry`), each of which
/// adds methods directly onto `Database` so callers never need to know which module a given
/// operation lives in.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(uri: &str, statement_timeout: Duration) -> Result<Self, sqlx::Error> {
        let millis = statement_timeout.as_millis();
        let pool = PgPoolOptions::new()
            .after_connect(move |conn| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {}", millis)).execute(conn).await?;
                    Ok(())
                })
            })
            .connect_lazy(uri)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Delete all data in the database. Only used by tests.
    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        use sqlx::Executor;
        self.pool.execute(sqlx::query("TRUNCATE transactions;")).await?;
        self.pool.execute(sqlx::query("TRUNCATE orders;")).await?;
        self.pool.execute(sqlx::query("TRUNCATE items;")).await?;
        self.pool.execute(sqlx::query("TRUNCATE markets;")).await?;
        Ok(())
    }
}
