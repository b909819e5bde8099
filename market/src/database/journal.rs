//! Append-only record of executed trades, canonicalized for symmetric querying and aggregation.

use model::error::CoreError;
use model::ids::{MarketId, TenantId, TransactionId};
use model::payload::ItemHash;
use model::transaction::{AggregateQuery, Transaction, TransactionAggregate, TransactionSide};
use sqlx::{PgExecutor, Row};

/// Records a trade, canonicalizing the two sides by descending item hash. Takes any executor so
/// it composes inside the matcher's and directed-fulfillment's own transactions.
pub async fn record<'c, E>(
    executor: E,
    tenant_id: TenantId,
    market_id: MarketId,
    amount: i64,
    first: TransactionSide,
    second: TransactionSide,
) -> Result<TransactionId, CoreError>
where
    E: PgExecutor<'c>,
{
    let (a, b) = Transaction::canonicalize(first, second);
    let transaction_id: TransactionId = sqlx::query_scalar(
        "INSERT INTO transactions \
         (tenant_id, market_id, date, amount, \
          a_name, a_payload, a_hash, a_amount_per_unit, a_owner_id, \
          b_name, b_payload, b_hash, b_amount_per_unit, b_owner_id) \
         VALUES ($1, $2, now(), $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING transaction_id",
    )
    .bind(tenant_id)
    .bind(market_id)
    .bind(amount)
    .bind(&a.name)
    .bind(&a.payload)
    .bind(a.hash)
    .bind(a.amount_per_unit)
    .bind(a.owner_id)
    .bind(&b.name)
    .bind(&b.payload)
    .bind(b.hash)
    .bind(b.amount_per_unit)
    .bind(b.owner_id)
    .fetch_one(executor)
    .await?;
    Ok(transaction_id)
}

/// Per-day aggregates (average give/take amount, summed trade amount) between two items,
/// descending by date. `query.limit` must be in `[1, 100]`.
pub async fn list_aggregated(
    database: &crate::database::Database,
    tenant_id: TenantId,
    market_id: MarketId,
    query: &AggregateQuery,
) -> Result<Vec<TransactionAggregate>, CoreError> {
    if !(1..=100).contains(&query.limit) {
        return Err(CoreError::validation("limit must be within [1, 100]"));
    }

    let give_hash = ItemHash::compute(&query.give_name, &query.give_payload);
    let take_hash = ItemHash::compute(&query.take_name, &query.take_payload);
    let (hash_a, hash_b) = if give_hash >= take_hash {
        (give_hash, take_hash)
    } else {
        (take_hash, give_hash)
    };

    let rows = sqlx::query(
        "SELECT date_trunc('day', date) AS day, \
                AVG(a_amount_per_unit) AS avg_give, \
                AVG(b_amount_per_unit) AS avg_take, \
                SUM(amount) AS total \
         FROM transactions \
         WHERE tenant_id = $1 AND market_id = $2 AND a_hash = $3 AND b_hash = $4 \
         GROUP BY day \
         ORDER BY day DESC \
         LIMIT $5",
    )
    .bind(tenant_id)
    .bind(market_id)
    .bind(hash_a)
    .bind(hash_b)
    .bind(query.limit)
    .fetch_all(database.pool())
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(TransactionAggregate {
                date: row.try_get("day")?,
                average_give_amount: row.try_get("avg_give")?,
                average_take_amount: row.try_get("avg_take")?,
                total_amount: row.try_get("total")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(CoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::setup;
    use model::ids::OwnerId;
    use model::payload::empty_payload;

    fn side(name: &str, amount_per_unit: i64, owner_id: OwnerId) -> TransactionSide {
        TransactionSide {
            name: name.to_string(),
            payload: empty_payload(),
            hash: ItemHash::compute(name, &empty_payload()),
            amount_per_unit,
            owner_id,
        }
    }

    /// The journal's symmetry invariant: whichever side's item hash sorts greater ends up in
    /// slot `a`, regardless of the order the two sides were passed in.
    #[tokio::test]
    #[ignore]
    async fn record_canonicalizes_sides_by_hash_regardless_of_call_order() {
        let (database, tenant_id, market_id) = setup().await;
        let alice = OwnerId(1);
        let bob = OwnerId(2);

        let bread = side("bread", 10, alice);
        let coin = side("coin", 1, bob);
        let forward = if bread.hash >= coin.hash { (bread.clone(), coin.clone()) } else { (coin.clone(), bread.clone()) };

        record(database.pool(), tenant_id, market_id, 1, bread.clone(), coin.clone()).await.unwrap();
        record(database.pool(), tenant_id, market_id, 1, coin, bread).await.unwrap();

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT a_name, b_name FROM transactions WHERE tenant_id = $1 ORDER BY transaction_id")
                .bind(tenant_id)
                .fetch_all(database.pool())
                .await
                .unwrap();
        assert_eq!(rows.len(), 2);
        for (a_name, b_name) in rows {
            assert_eq!(a_name, forward.0.name);
            assert_eq!(b_name, forward.1.name);
        }
    }

    #[tokio::test]
    #[ignore]
    async fn list_aggregated_sums_same_day_trades() {
        let (database, tenant_id, market_id) = setup().await;
        let alice = OwnerId(1);
        let bob = OwnerId(2);

        record(database.pool(), tenant_id, market_id, 2, side("bread", 10, alice), side("coin", 1, bob))
            .await
            .unwrap();
        record(database.pool(), tenant_id, market_id, 3, side("bread", 10, alice), side("coin", 1, bob))
            .await
            .unwrap();

        let query = AggregateQuery {
            give_name: "bread".to_string(),
            give_payload: empty_payload(),
            take_name: "coin".to_string(),
            take_payload: empty_payload(),
            limit: 10,
        };
        let aggregates = list_aggregated(&database, tenant_id, market_id, &query).await.unwrap();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].total_amount, 5);
    }

    #[tokio::test]
    #[ignore]
    async fn list_aggregated_rejects_limit_outside_range() {
        let (database, tenant_id, market_id) = setup().await;
        let query = AggregateQuery {
            give_name: "bread".to_string(),
            give_payload: empty_payload(),
            take_name: "coin".to_string(),
            take_payload: empty_payload(),
            limit: 0,
        };
        let result = list_aggregated(&database, tenant_id, market_id, &query).await;
        assert!(matches!(result, Err(err) if err.kind == model::error::ErrorKind::Validation));
    }
}
