//! Per-(tenant, owner, market, item, payload-hash) balances with additive/subtractive ops and
//! all-or-nothing batch updates. `amount >= 0` at every commit boundary is the ledger's sole
//! invariant; `subtract`'s conditional `WHERE` clause is what enforces it under concurrency.

use super::Database;
use model::error::CoreError;
use model::ids::{MarketId, OwnerId, TenantId};
use model::item::ItemBalance;
use model::payload::{ItemHash, Payload};
use sqlx::PgExecutor;

/// Looks up a balance by its computed hash. Returns `0` (not `NotFound`) for an absent row: a
/// missing ledger row and a zero-amount row are the same thing to every caller in this core.
pub async fn get_balance<'c, E>(
    executor: E,
    tenant_id: TenantId,
    owner_id: OwnerId,
    market_id: MarketId,
    name: &str,
    payload: &Payload,
) -> Result<i64, CoreError>
where
    E: PgExecutor<'c>,
{
    let hash = ItemHash::compute(name, payload);
    let amount: Option<i64> = sqlx::query_scalar(
        "SELECT amount FROM items \
         WHERE tenant_id = $1 AND owner_id = $2 AND market_id = $3 AND hash = $4",
    )
    .bind(tenant_id)
    .bind(owner_id)
    .bind(market_id)
    .bind(hash)
    .fetch_optional(executor)
    .await?;
    Ok(amount.unwrap_or(0))
}

/// All non-zero balances an owner holds in a market.
pub async fn list_balances<'c, E>(
    executor: E,
    tenant_id: TenantId,
    owner_id: OwnerId,
    market_id: MarketId,
) -> Result<Vec<ItemBalance>, CoreError>
where
    E: PgExecutor<'c>,
{
    let rows = sqlx::query_as::<_, ItemBalance>(
        "SELECT tenant_id, market_id, owner_id, name, payload, amount FROM items \
         WHERE tenant_id = $1 AND owner_id = $2 AND market_id = $3 AND amount != 0",
    )
    .bind(tenant_id)
    .bind(owner_id)
    .bind(market_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Deletes every item-balance row an owner holds within a tenant, across all markets. Used by
/// the account deletion cascade; returns the number of rows removed.
pub async fn delete_items_by_owner<'c, E>(
    executor: E,
    tenant_id: TenantId,
    owner_id: OwnerId,
) -> Result<u64, CoreError>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query("DELETE FROM items WHERE tenant_id = $1 AND owner_id = $2")
        .bind(tenant_id)
        .bind(owner_id)
        .execute(executor)
        .await?;
    let deleted = result.rows_affected();
    tracing::debug!(%tenant_id, %owner_id, deleted, "ledger rows deleted for owner");
    Ok(deleted)
}

/// Deletes every item-balance row an owner holds across every tenant and market. Used by the
/// global (cross-tenant) account deletion cascade.
pub async fn delete_items_by_owner_global<'c, E>(executor: E, owner_id: OwnerId) -> Result<u64, CoreError>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query("DELETE FROM items WHERE owner_id = $1")
        .bind(owner_id)
        .execute(executor)
        .await?;
    let deleted = result.rows_affected();
    tracing::debug!(%owner_id, deleted, "ledger rows deleted for owner (global)");
    Ok(deleted)
}

/// Upserts `amount` onto the existing balance (additive). Internal callers only ever pass a
/// strictly positive `amount`; the statement itself does not enforce that.
pub async fn add<'c, E>(
    executor: E,
    tenant_id: TenantId,
    owner_id: OwnerId,
    market_id: MarketId,
    name: &str,
    payload: &Payload,
    amount: i64,
) -> Result<(), CoreError>
where
    E: PgExecutor<'c>,
{
    let hash = ItemHash::compute(name, payload);
    sqlx::query(
        "INSERT INTO items (tenant_id, owner_id, market_id, name, payload, hash, amount) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (tenant_id, owner_id, market_id, hash) \
         DO UPDATE SET amount = items.amount + EXCLUDED.amount",
    )
    .bind(tenant_id)
    .bind(owner_id)
    .bind(market_id)
    .bind(name)
    .bind(payload)
    .bind(hash)
    .bind(amount)
    .execute(executor)
    .await?;
    tracing::debug!(%tenant_id, %owner_id, %market_id, name, amount, "ledger add");
    Ok(())
}

/// Conditional decrement: succeeds only if the current balance is at least `amount`. Returns
/// whether a row was affected. This is the only primitive allowed to take a balance negative and
/// it never does.
pub async fn subtract<'c, E>(
    executor: E,
    tenant_id: TenantId,
    owner_id: OwnerId,
    market_id: MarketId,
    name: &str,
    payload: &Payload,
    amount: i64,
) -> Result<bool, CoreError>
where
    E: PgExecutor<'c>,
{
    let hash = ItemHash::compute(name, payload);
    let result = sqlx::query(
        "UPDATE items SET amount = amount - $5 \
         WHERE tenant_id = $1 AND owner_id = $2 AND market_id = $3 AND hash = $4 AND amount >= $5",
    )
    .bind(tenant_id)
    .bind(owner_id)
    .bind(market_id)
    .bind(hash)
    .bind(amount)
    .execute(executor)
    .await?;
    let affected = result.rows_affected() > 0;
    tracing::debug!(%tenant_id, %owner_id, %market_id, name, amount, affected, "ledger subtract");
    Ok(affected)
}

/// One entry of a `batch_update`: an item name, its payload, and the signed delta to apply.
pub struct BatchDelta {
    pub name: String,
    pub payload: Payload,
    pub delta: i64,
}

/// Atomic batch update: every negative delta is prechecked against the current balance (under row
/// lock) before any mutation is applied, so a batch containing one impossible subtraction never
/// partially executes.
pub async fn batch_update(
    database: &Database,
    tenant_id: TenantId,
    owner_id: OwnerId,
    market_id: MarketId,
    items: &[BatchDelta],
) -> Result<(), CoreError> {
    let mut txn = database.pool().begin().await?;

    for item in items.iter().filter(|item| item.delta < 0) {
        let hash = ItemHash::compute(&item.name, &item.payload);
        let current: Option<i64> = sqlx::query_scalar(
            "SELECT amount FROM items \
             WHERE tenant_id = $1 AND owner_id = $2 AND market_id = $3 AND hash = $4 FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(owner_id)
        .bind(market_id)
        .bind(hash)
        .fetch_optional(&mut txn)
        .await?;
        let current = current.unwrap_or(0);
        if current < -item.delta {
            return Err(CoreError::insufficient(format!(
                "not enough '{}': have {}, need {}",
                item.name, current, -item.delta
            )));
        }
    }

    for item in items.iter().filter(|item| item.delta < 0) {
        let applied = subtract(
            &mut txn,
            tenant_id,
            owner_id,
            market_id,
            &item.name,
            &item.payload,
            -item.delta,
        )
        .await?;
        if !applied {
            return Err(CoreError::insufficient(format!(
                "not enough '{}' (lost race with a concurrent batch)",
                item.name
            )));
        }
    }

    for item in items.iter().filter(|item| item.delta > 0) {
        add(
            &mut txn,
            tenant_id,
            owner_id,
            market_id,
            &item.name,
            &item.payload,
            item.delta,
        )
        .await?;
    }

    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::setup;
    use model::ids::OwnerId;
    use model::payload::empty_payload;

    #[tokio::test]
    #[ignore]
    async fn add_then_subtract_round_trips() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(1);
        add(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 10)
            .await
            .unwrap();
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload())
                .await
                .unwrap(),
            10
        );
        let ok = subtract(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 4)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload())
                .await
                .unwrap(),
            6
        );
    }

    #[tokio::test]
    #[ignore]
    async fn subtract_refuses_to_overdraw() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(2);
        add(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload(), 5)
            .await
            .unwrap();
        let ok = subtract(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload(), 6)
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload())
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    #[ignore]
    async fn get_balance_of_unknown_item_is_zero_not_an_error() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(3);
        let amount = get_balance(database.pool(), tenant_id, owner_id, market_id, "unobtainium", &empty_payload())
            .await
            .unwrap();
        assert_eq!(amount, 0);
    }

    /// Scenario 7: buyer with {bread: 3, coin: 5} submits a batch withdrawing 2 bread and 10
    /// coin. The coin leg cannot be satisfied, so neither mutation should commit.
    #[tokio::test]
    #[ignore]
    async fn insufficient_batch_leaves_both_balances_untouched() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(4);
        add(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 3)
            .await
            .unwrap();
        add(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload(), 5)
            .await
            .unwrap();

        let items = vec![
            BatchDelta { name: "bread".to_string(), payload: empty_payload(), delta: -2 },
            BatchDelta { name: "coin".to_string(), payload: empty_payload(), delta: -10 },
        ];
        let result = batch_update(&database, tenant_id, owner_id, market_id, &items).await;
        assert!(matches!(result, Err(err) if err.kind == model::error::ErrorKind::Insufficient));

        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload())
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload())
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    #[ignore]
    async fn batch_update_applies_negatives_and_positives_together() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(5);
        add(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 10)
            .await
            .unwrap();

        let items = vec![
            BatchDelta { name: "bread".to_string(), payload: empty_payload(), delta: -4 },
            BatchDelta { name: "coin".to_string(), payload: empty_payload(), delta: 7 },
        ];
        batch_update(&database, tenant_id, owner_id, market_id, &items).await.unwrap();

        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload())
                .await
                .unwrap(),
            6
        );
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload())
                .await
                .unwrap(),
            7
        );
    }

    #[tokio::test]
    #[ignore]
    async fn list_balances_excludes_zero_amount_rows() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(6);
        add(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 5)
            .await
            .unwrap();
        add(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload(), 5)
            .await
            .unwrap();
        subtract(database.pool(), tenant_id, owner_id, market_id, "coin", &empty_payload(), 5)
            .await
            .unwrap();

        let balances = list_balances(database.pool(), tenant_id, owner_id, market_id).await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].name, "bread");
    }

    #[tokio::test]
    #[ignore]
    async fn delete_items_by_owner_clears_only_that_tenant() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(7);
        add(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 3)
            .await
            .unwrap();

        let deleted = delete_items_by_owner(database.pool(), tenant_id, owner_id).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    #[ignore]
    async fn delete_items_by_owner_global_clears_every_tenant() {
        let (database, tenant_id, market_id) = setup().await;
        let owner_id = OwnerId(8);
        add(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload(), 3)
            .await
            .unwrap();

        let deleted = delete_items_by_owner_global(database.pool(), owner_id).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            get_balance(database.pool(), tenant_id, owner_id, market_id, "bread", &empty_payload())
                .await
                .unwrap(),
            0
        );
    }
}
