//! The matching engine. Two entry points: `match_order` sweeps the book opportunistically after
//! a post or edit; `fulfill_order_with_account` executes one buyer's directed fill of a specific
//! order. Both run inside a single transaction with deterministic lock acquisition (the subject
//! row first, then candidates in the query's sort order) to reduce deadlock probability.

use super::{journal, ledger};
use super::Database;
use model::error::CoreError;
use model::ids::{MarketId, OrderId, OwnerId, TenantId};
use model::order::Order;
use model::payload::ItemHash;
use model::transaction::TransactionSide;
use model::notification::OrderCompletedPayload;

/// One `order_completed` notification still to be delivered, paired with its recipient.
pub struct Completion {
    pub owner_id: OwnerId,
    pub payload: OrderCompletedPayload,
}

pub struct MatchOutcome {
    /// Whether the subject order was fully consumed (and therefore deleted).
    pub fully_consumed: bool,
    /// Completion events in emission order: for each fill, the subject's event precedes the
    /// counter-order's event.
    pub completions: Vec<Completion>,
}

fn completed_payload(order: &Order, amount_completed: i64, amount_left: i64) -> OrderCompletedPayload {
    OrderCompletedPayload {
        order_id: order.order_id,
        give_name: order.give_name.clone(),
        give_amount: order.give_amount,
        give_payload: order.give_payload.clone(),
        take_name: order.take_name.clone(),
        take_amount: order.take_amount,
        take_payload: order.take_payload.clone(),
        amount_completed,
        amount_left,
        payload: order.payload.clone(),
    }
}

fn side_from_give(order: &Order) -> TransactionSide {
    TransactionSide {
        name: order.give_name.clone(),
        payload: order.give_payload.clone(),
        hash: ItemHash::compute(&order.give_name, &order.give_payload),
        amount_per_unit: order.give_amount,
        owner_id: order.owner_id,
    }
}

const ORDER_COLUMNS: &str = "order_id, tenant_id, market_id, owner_id, give_name, give_payload, give_amount, \
                              take_name, take_payload, take_amount, available, payload, deadline, created_at";

/// Sweeps the book for counter-orders satisfying `order_id` and executes as many fills as
/// possible in one transaction, rebating any price differential back to the subject's owner.
pub async fn match_order(
    database: &Database,
    tenant_id: TenantId,
    market_id: MarketId,
    order_id: OrderId,
) -> Result<MatchOutcome, CoreError> {
    let mut txn = database.pool().begin().await?;

    let subject = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE tenant_id = $1 AND order_id = $2 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(&mut txn)
    .await?;

    let subject = match subject {
        Some(order) if order.available > 0 => order,
        _ => {
            txn.commit().await?;
            return Ok(MatchOutcome { fully_consumed: false, completions: Vec::new() });
        }
    };

    // Asymmetric payload compatibility: what the subject demands (take_payload) must be
    // satisfied by what the candidate offers (give_payload), and vice versa. Binding order
    // matters here — `$6 @> take_payload` is "subject's give_payload contains candidate's
    // take_payload", not the other way around.
    let candidates = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders \
         WHERE tenant_id = $1 AND market_id = $2 AND order_id != $3 \
           AND take_name = $4 AND give_name = $5 \
           AND $6 @> take_payload AND give_payload @> $7 \
           AND give_amount >= $8 AND take_amount <= $9 \
           AND owner_id != $10 \
         ORDER BY take_amount ASC, give_amount ASC, created_at DESC \
         FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(tenant_id)
    .bind(market_id)
    .bind(order_id)
    .bind(&subject.give_name)
    .bind(&subject.take_name)
    .bind(&subject.give_payload)
    .bind(&subject.take_payload)
    .bind(subject.take_amount)
    .bind(subject.give_amount)
    .bind(subject.owner_id)
    .fetch_all(&mut txn)
    .await?;

    let mut orders_to_fulfill = subject.available;
    let mut backup: i64 = 0;
    let mut completions = Vec::new();

    for candidate in candidates {
        if orders_to_fulfill == 0 {
            break;
        }
        let fill = orders_to_fulfill.min(candidate.available);
        let price_diff = subject.give_amount - candidate.take_amount;
        backup += price_diff * fill;

        journal::record(
            &mut txn,
            tenant_id,
            market_id,
            fill,
            side_from_give(&subject),
            side_from_give(&candidate),
        )
        .await?;

        ledger::add(
            &mut txn,
            tenant_id,
            candidate.owner_id,
            market_id,
            &subject.give_name,
            &subject.give_payload,
            fill * candidate.take_amount,
        )
        .await?;
        ledger::add(
            &mut txn,
            tenant_id,
            subject.owner_id,
            market_id,
            &candidate.give_name,
            &candidate.give_payload,
            fill * subject.take_amount,
        )
        .await?;

        let matched_backup = (candidate.give_amount - subject.take_amount) * fill;
        if matched_backup > 0 {
            ledger::add(
                &mut txn,
                tenant_id,
                candidate.owner_id,
                market_id,
                &candidate.give_name,
                &candidate.give_payload,
                matched_backup,
            )
            .await?;
        }

        let candidate_remaining = candidate.available - fill;
        if candidate_remaining == 0 {
            sqlx::query("DELETE FROM orders WHERE tenant_id = $1 AND order_id = $2")
                .bind(tenant_id)
                .bind(candidate.order_id)
                .execute(&mut txn)
                .await?;
        } else {
            sqlx::query("UPDATE orders SET available = $1 WHERE tenant_id = $2 AND order_id = $3")
                .bind(candidate_remaining)
                .bind(tenant_id)
                .bind(candidate.order_id)
                .execute(&mut txn)
                .await?;
        }

        orders_to_fulfill -= fill;

        completions.push(Completion {
            owner_id: subject.owner_id,
            payload: completed_payload(&subject, fill, orders_to_fulfill),
        });
        completions.push(Completion {
            owner_id: candidate.owner_id,
            payload: completed_payload(&candidate, fill, candidate_remaining),
        });
    }

    let fully_consumed = orders_to_fulfill == 0;
    if fully_consumed {
        sqlx::query("DELETE FROM orders WHERE tenant_id = $1 AND order_id = $2")
            .bind(tenant_id)
            .bind(order_id)
            .execute(&mut txn)
            .await?;
    } else if orders_to_fulfill != subject.available {
        sqlx::query("UPDATE orders SET available = $1 WHERE tenant_id = $2 AND order_id = $3")
            .bind(orders_to_fulfill)
            .bind(tenant_id)
            .bind(order_id)
            .execute(&mut txn)
            .await?;
    }

    if backup > 0 {
        ledger::add(
            &mut txn,
            tenant_id,
            subject.owner_id,
            market_id,
            &subject.give_name,
            &subject.give_payload,
            backup,
        )
        .await?;
    }

    txn.commit().await?;
    Ok(MatchOutcome { fully_consumed, completions })
}

/// The outcome of a directed fulfillment that actually ran (the order existed, was lockable, and
/// the buyer had sufficient funds). `None` at the call site means none of that held.
pub struct FulfillOutcome {
    pub fully_consumed: bool,
    pub completion: Completion,
}

/// Fulfills `count` units of `order_id` out of `buyer_id`'s inventory. Returns `None` rather than
/// an error when the order cannot be found/locked under the stated conditions or the buyer lacks
/// the funds — "cannot fulfill" is a normal outcome, not a failure.
pub async fn fulfill_order_with_account(
    database: &Database,
    tenant_id: TenantId,
    market_id: MarketId,
    order_id: OrderId,
    buyer_id: OwnerId,
    count: i64,
) -> Result<Option<FulfillOutcome>, CoreError> {
    if count < 1 {
        return Err(CoreError::validation("count must be at least 1"));
    }

    let mut txn = database.pool().begin().await?;

    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders \
         WHERE tenant_id = $1 AND order_id = $2 AND market_id = $3 \
           AND available >= $4 AND owner_id != $5 \
         FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(tenant_id)
    .bind(order_id)
    .bind(market_id)
    .bind(count)
    .bind(buyer_id)
    .fetch_optional(&mut txn)
    .await?;

    let order = match order {
        Some(order) => order,
        None => return Ok(None),
    };

    let need = order.take_amount * count;
    let give = order.give_amount * count;

    let paid = ledger::subtract(
        &mut txn,
        tenant_id,
        buyer_id,
        market_id,
        &order.take_name,
        &order.take_payload,
        need,
    )
    .await?;
    if !paid {
        return Ok(None);
    }

    ledger::add(
        &mut txn,
        tenant_id,
        order.owner_id,
        market_id,
        &order.take_name,
        &order.take_payload,
        need,
    )
    .await?;
    ledger::add(
        &mut txn,
        tenant_id,
        buyer_id,
        market_id,
        &order.give_name,
        &order.give_payload,
        give,
    )
    .await?;

    let give_side = side_from_give(&order);
    let take_side = TransactionSide {
        name: order.take_name.clone(),
        payload: order.take_payload.clone(),
        hash: ItemHash::compute(&order.take_name, &order.take_payload),
        amount_per_unit: order.take_amount,
        owner_id: buyer_id,
    };
    journal::record(&mut txn, tenant_id, market_id, count, give_side, take_side).await?;

    let remaining = order.available - count;
    if remaining == 0 {
        sqlx::query("DELETE FROM orders WHERE tenant_id = $1 AND order_id = $2")
            .bind(tenant_id)
            .bind(order_id)
            .execute(&mut txn)
            .await?;
    } else {
        sqlx::query("UPDATE orders SET available = $1 WHERE tenant_id = $2 AND order_id = $3")
            .bind(remaining)
            .bind(tenant_id)
            .bind(order_id)
            .execute(&mut txn)
            .await?;
    }

    txn.commit().await?;

    Ok(Some(FulfillOutcome {
        fully_consumed: remaining == 0,
        completion: Completion {
            owner_id: order.owner_id,
            payload: completed_payload(&order, count, remaining),
        },
    }))
}
