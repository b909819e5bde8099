//! Market metadata CRUD and cascading deletion.

use super::Database;
use model::error::CoreError;
use model::ids::{MarketId, TenantId};
use model::market::{Market, MarketUpdate, NewMarket};

pub async fn new_market(database: &Database, tenant_id: TenantId, new_market: &NewMarket) -> Result<MarketId, CoreError> {
    let market_id: MarketId = sqlx::query_scalar(
        "INSERT INTO markets (tenant_id, name, settings) VALUES ($1, $2, $3) RETURNING market_id",
    )
    .bind(tenant_id)
    .bind(&new_market.name)
    .bind(&new_market.settings)
    .fetch_one(database.pool())
    .await?;
    Ok(market_id)
}

pub async fn get_market(database: &Database, tenant_id: TenantId, market_id: MarketId) -> Result<Market, CoreError> {
    sqlx::query_as::<_, Market>(
        "SELECT market_id, tenant_id, name, settings FROM markets WHERE tenant_id = $1 AND market_id = $2",
    )
    .bind(tenant_id)
    .bind(market_id)
    .fetch_optional(database.pool())
    .await?
    .ok_or_else(|| CoreError::not_found(format!("market {} not found", market_id)))
}

pub async fn list_markets(database: &Database, tenant_id: TenantId) -> Result<Vec<Market>, CoreError> {
    let markets = sqlx::query_as::<_, Market>(
        "SELECT market_id, tenant_id, name, settings FROM markets WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_all(database.pool())
    .await?;
    Ok(markets)
}

pub async fn update_market(
    database: &Database,
    tenant_id: TenantId,
    market_id: MarketId,
    update: &MarketUpdate,
) -> Result<Market, CoreError> {
    if let Some(name) = &update.name {
        let result = sqlx::query("UPDATE markets SET name = $1 WHERE tenant_id = $2 AND market_id = $3")
            .bind(name)
            .bind(tenant_id)
            .bind(market_id)
            .execute(database.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("market {} not found", market_id)));
        }
    }
    if let Some(settings) = &update.settings {
        let result = sqlx::query("UPDATE markets SET settings = $1 WHERE tenant_id = $2 AND market_id = $3")
            .bind(settings)
            .bind(tenant_id)
            .bind(market_id)
            .execute(database.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("market {} not found", market_id)));
        }
    }
    get_market(database, tenant_id, market_id).await
}

/// Deletes the market row, then every order and every item balance scoped to it, in one
/// transaction. No refund is issued: escrowed goods belonging to deleted orders are discarded
/// along with the orders themselves.
pub async fn delete_market(database: &Database, tenant_id: TenantId, market_id: MarketId) -> Result<(), CoreError> {
    let mut txn = database.pool().begin().await?;

    let result = sqlx::query("DELETE FROM markets WHERE tenant_id = $1 AND market_id = $2")
        .bind(tenant_id)
        .bind(market_id)
        .execute(&mut txn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found(format!("market {} not found", market_id)));
    }

    sqlx::query("DELETE FROM orders WHERE tenant_id = $1 AND market_id = $2")
        .bind(tenant_id)
        .bind(market_id)
        .execute(&mut txn)
        .await?;
    sqlx::query("DELETE FROM items WHERE tenant_id = $1 AND market_id = $2")
        .bind(tenant_id)
        .bind(market_id)
        .execute(&mut txn)
        .await?;

    txn.commit().await?;
    tracing::info!(%tenant_id, %market_id, "deleted market and cascaded orders/items");
    Ok(())
}
