//! Order lifecycle: post (with escrow), fetch, edit, cancel (with refund), and filtered query.

use super::ledger;
use super::Database;
use chrono::Utc;
use model::error::CoreError;
use model::ids::{MarketId, OrderId, OwnerId, TenantId};
use model::order::{NewOrder, Order, OrderFilter, OrderSort, OrderUpdate};
use sqlx::{PgExecutor, Postgres, QueryBuilder};

/// Offset/limit pagination beyond this many rows is rejected rather than silently truncated.
const MAX_PAGE_SIZE: i64 = 1000;

/// Escrows `give_amount * available` of the offered item (if `subtract_items`) and inserts the
/// order row in one transaction.
pub async fn post_order(
    database: &Database,
    tenant_id: TenantId,
    owner_id: OwnerId,
    market_id: MarketId,
    new_order: &NewOrder,
) -> Result<OrderId, CoreError> {
    if new_order.deadline <= Utc::now() {
        return Err(CoreError::validation("deadline must be in the future"));
    }
    if new_order.give_amount < 1 || new_order.take_amount < 1 {
        return Err(CoreError::validation("amounts must be at least 1"));
    }
    if new_order.available < 1 {
        return Err(CoreError::validation("available must be at least 1"));
    }

    let mut txn = database.pool().begin().await?;

    if new_order.subtract_items {
        let escrow = new_order.give_amount * new_order.available;
        let ok = ledger::subtract(
            &mut txn,
            tenant_id,
            owner_id,
            market_id,
            &new_order.give_name,
            &new_order.give_payload,
            escrow,
        )
        .await?;
        if !ok {
            return Err(CoreError::insufficient(format!(
                "not enough '{}' to escrow {} units",
                new_order.give_name, escrow
            )));
        }
    }

    let order_id: OrderId = sqlx::query_scalar(
        "INSERT INTO orders \
         (tenant_id, market_id, owner_id, give_name, give_payload, give_amount, \
          take_name, take_payload, take_amount, available, payload, deadline, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now()) \
         RETURNING order_id",
    )
    .bind(tenant_id)
    .bind(market_id)
    .bind(owner_id)
    .bind(&new_order.give_name)
    .bind(&new_order.give_payload)
    .bind(new_order.give_amount)
    .bind(&new_order.take_name)
    .bind(&new_order.take_payload)
    .bind(new_order.take_amount)
    .bind(new_order.available)
    .bind(&new_order.payload)
    .bind(new_order.deadline)
    .fetch_one(&mut txn)
    .await?;

    txn.commit().await?;
    tracing::debug!(%tenant_id, %owner_id, %order_id, "posted order");
    Ok(order_id)
}

pub async fn get_order<'c, E>(executor: E, tenant_id: TenantId, order_id: OrderId) -> Result<Order, CoreError>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, Order>(
        "SELECT order_id, tenant_id, market_id, owner_id, give_name, give_payload, give_amount, \
                take_name, take_payload, take_amount, available, payload, deadline, created_at \
         FROM orders WHERE tenant_id = $1 AND order_id = $2",
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| CoreError::not_found(format!("order {} not found", order_id)))
}

/// Rewrites the editable fields of an order owned by `owner_id`, reconciling escrow: if
/// `give_amount` or `available` change such that the required escrow (`give_amount * available`)
/// grows, the difference is subtracted from the owner's ledger in the same transaction (failing
/// with `Insufficient` if they don't have it); if it shrinks, the difference is refunded. This
/// keeps the escrow invariant intact across edits instead of silently drifting out of sync with
/// the ledger.
pub async fn update_order(
    database: &Database,
    tenant_id: TenantId,
    owner_id: OwnerId,
    order_id: OrderId,
    update: &OrderUpdate,
) -> Result<Order, CoreError> {
    if let Some(give_amount) = update.give_amount {
        if give_amount < 1 {
            return Err(CoreError::validation("give_amount must be at least 1"));
        }
    }
    if let Some(take_amount) = update.take_amount {
        if take_amount < 1 {
            return Err(CoreError::validation("take_amount must be at least 1"));
        }
    }
    if let Some(available) = update.available {
        if available < 1 {
            return Err(CoreError::validation("available must be at least 1"));
        }
    }

    let mut txn = database.pool().begin().await?;

    let order = sqlx::query_as::<_, Order>(
        "SELECT order_id, tenant_id, market_id, owner_id, give_name, give_payload, give_amount, \
                take_name, take_payload, take_amount, available, payload, deadline, created_at \
         FROM orders WHERE tenant_id = $1 AND order_id = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(&mut txn)
    .await?
    .ok_or_else(|| CoreError::not_found(format!("order {} not found", order_id)))?;

    if order.owner_id != owner_id {
        return Err(CoreError::forbidden("order does not belong to caller"));
    }

    let new_give_amount = update.give_amount.unwrap_or(order.give_amount);
    let new_available = update.available.unwrap_or(order.available);
    let old_escrow = order.give_amount * order.available;
    let new_escrow = new_give_amount * new_available;

    if new_escrow > old_escrow {
        let need = new_escrow - old_escrow;
        let ok = ledger::subtract(
            &mut txn,
            tenant_id,
            owner_id,
            order.market_id,
            &order.give_name,
            &order.give_payload,
            need,
        )
        .await?;
        if !ok {
            return Err(CoreError::insufficient(format!(
                "not enough '{}' to grow escrow by {} units",
                order.give_name, need
            )));
        }
    } else if new_escrow < old_escrow {
        let refund = old_escrow - new_escrow;
        ledger::add(&mut txn, tenant_id, owner_id, order.market_id, &order.give_name, &order.give_payload, refund)
            .await?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE orders SET ");
    let mut first = true;
    macro_rules! set_field {
        ($sql:literal, $value:expr) => {
            if let Some(value) = $value {
                if !first {
                    builder.push(", ");
                }
                first = false;
                builder.push($sql);
                builder.push_bind(value);
            }
        };
    }
    set_field!("give_amount = ", update.give_amount);
    set_field!("take_amount = ", update.take_amount);
    set_field!("available = ", update.available);
    set_field!("payload = ", update.payload.clone());
    set_field!("deadline = ", update.deadline);
    if !first {
        builder.push(" WHERE tenant_id = ");
        builder.push_bind(tenant_id);
        builder.push(" AND order_id = ");
        builder.push_bind(order_id);
        builder.build().execute(&mut txn).await?;
    }

    txn.commit().await?;
    get_order(database.pool(), tenant_id, order_id).await
}

/// Cancels an order, refunding its full escrow to the owner, in a single transaction. Returns the
/// order as it existed immediately before deletion so the caller can emit a notification. Used by
/// system-initiated cancellation (the reaper, the account-deletion cascade) where there is no
/// caller identity to check against; owner-initiated deletion goes through `delete_order_as_owner`.
pub async fn delete_order(database: &Database, tenant_id: TenantId, order_id: OrderId) -> Result<Order, CoreError> {
    let mut txn = database.pool().begin().await?;
    let order = delete_order_locked(&mut txn, tenant_id, order_id).await?;
    txn.commit().await?;
    tracing::debug!(%tenant_id, %order_id, "deleted order, refunded escrow");
    Ok(order)
}

/// Cancels an order on behalf of `owner_id`, rejecting the deletion with `Forbidden` if the
/// caller does not own it. This is the path the HTTP surface's `delete` route uses.
pub async fn delete_order_as_owner(
    database: &Database,
    tenant_id: TenantId,
    owner_id: OwnerId,
    order_id: OrderId,
) -> Result<Order, CoreError> {
    let mut txn = database.pool().begin().await?;

    let owner_of_order: Option<OwnerId> =
        sqlx::query_scalar("SELECT owner_id FROM orders WHERE tenant_id = $1 AND order_id = $2 FOR UPDATE")
            .bind(tenant_id)
            .bind(order_id)
            .fetch_optional(&mut txn)
            .await?;
    match owner_of_order {
        None => return Err(CoreError::not_found(format!("order {} not found", order_id))),
        Some(actual_owner) if actual_owner != owner_id => {
            return Err(CoreError::forbidden("order does not belong to caller"))
        }
        Some(_) => {}
    }

    let order = delete_order_locked(&mut txn, tenant_id, order_id).await?;
    txn.commit().await?;
    tracing::debug!(%tenant_id, %owner_id, %order_id, "deleted order, refunded escrow");
    Ok(order)
}

/// Shared core of order cancellation: load the row (assumed already locked by the caller),
/// refund its escrow, and delete it. Does not commit.
async fn delete_order_locked(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: TenantId,
    order_id: OrderId,
) -> Result<Order, CoreError> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT order_id, tenant_id, market_id, owner_id, give_name, give_payload, give_amount, \
                take_name, take_payload, take_amount, available, payload, deadline, created_at \
         FROM orders WHERE tenant_id = $1 AND order_id = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(&mut *txn)
    .await?
    .ok_or_else(|| CoreError::not_found(format!("order {} not found", order_id)))?;

    ledger::add(
        &mut *txn,
        tenant_id,
        order.owner_id,
        order.market_id,
        &order.give_name,
        &order.give_payload,
        order.give_amount * order.available,
    )
    .await?;

    sqlx::query("DELETE FROM orders WHERE tenant_id = $1 AND order_id = $2")
        .bind(tenant_id)
        .bind(order_id)
        .execute(&mut *txn)
        .await?;

    Ok(order)
}

/// Deletes every order owned by `owner_id`, refunding escrow for each. Used by the account
/// deletion cascade; returns the deleted orders so the caller can notify for each.
pub async fn delete_orders_by_owner(
    database: &Database,
    tenant_id: TenantId,
    owner_id: OwnerId,
) -> Result<Vec<Order>, CoreError> {
    let order_ids: Vec<OrderId> = sqlx::query_scalar(
        "SELECT order_id FROM orders WHERE tenant_id = $1 AND owner_id = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(owner_id)
    .fetch_all(database.pool())
    .await?;

    let mut deleted = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
        match delete_order(database, tenant_id, order_id).await {
            Ok(order) => deleted.push(order),
            Err(err) => tracing::error!(%tenant_id, %order_id, ?err, "failed to delete order during cascade"),
        }
    }
    Ok(deleted)
}

/// Deletes every order owned by `owner_id` across every tenant, refunding escrow for each. Used
/// by the global (cross-tenant) account deletion cascade.
pub async fn delete_orders_by_owner_global(
    database: &Database,
    owner_id: OwnerId,
) -> Result<Vec<Order>, CoreError> {
    let order_ids: Vec<(TenantId, OrderId)> = sqlx::query_as(
        "SELECT tenant_id, order_id FROM orders WHERE owner_id = $1 FOR UPDATE",
    )
    .bind(owner_id)
    .fetch_all(database.pool())
    .await?;

    let mut deleted = Vec::with_capacity(order_ids.len());
    for (tenant_id, order_id) in order_ids {
        match delete_order(database, tenant_id, order_id).await {
            Ok(order) => deleted.push(order),
            Err(err) => tracing::error!(%tenant_id, %order_id, ?err, "failed to delete order during cascade"),
        }
    }
    Ok(deleted)
}

pub async fn query(
    database: &Database,
    tenant_id: TenantId,
    market_id: MarketId,
    filter: &OrderFilter,
) -> Result<Vec<Order>, CoreError> {
    if filter.limit > MAX_PAGE_SIZE {
        return Err(CoreError::validation(format!(
            "limit must not exceed {}",
            MAX_PAGE_SIZE
        )));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT order_id, tenant_id, market_id, owner_id, give_name, give_payload, give_amount, \
                take_name, take_payload, take_amount, available, payload, deadline, created_at \
         FROM orders WHERE tenant_id = ",
    );
    builder.push_bind(tenant_id);
    builder.push(" AND market_id = ");
    builder.push_bind(market_id);

    if let Some(owner_id) = filter.owner_id {
        builder.push(" AND owner_id = ");
        builder.push_bind(owner_id);
    }
    if let Some(give_name) = &filter.give_name {
        builder.push(" AND give_name = ");
        builder.push_bind(give_name.clone());
    }
    if let Some(give_payload) = &filter.give_payload {
        builder.push(" AND give_payload @> ");
        builder.push_bind(give_payload.clone());
    }
    if let Some(take_name) = &filter.take_name {
        builder.push(" AND take_name = ");
        builder.push_bind(take_name.clone());
    }
    // Filtering by take_payload compares against this order's take_payload, not give_payload.
    if let Some(take_payload) = &filter.take_payload {
        builder.push(" AND take_payload @> ");
        builder.push_bind(take_payload.clone());
    }
    if let (Some(amount), Some(comparator)) = (filter.give_amount, filter.give_amount_comparator) {
        builder.push(" AND give_amount ");
        builder.push(comparator.sql_operator());
        builder.push(" ");
        builder.push_bind(amount);
    }
    if let (Some(amount), Some(comparator)) = (filter.take_amount, filter.take_amount_comparator) {
        builder.push(" AND take_amount ");
        builder.push(comparator.sql_operator());
        builder.push(" ");
        builder.push_bind(amount);
    }

    let sort_column = match filter.sort_by {
        Some(OrderSort::TakeAmount) => Some("take_amount"),
        Some(OrderSort::GiveAmount) => Some("give_amount"),
        None => None,
    };
    builder.push(" ORDER BY ");
    if let Some(column) = sort_column {
        builder.push(column);
        builder.push(if filter.sort_descending { " DESC, " } else { " ASC, " });
    }
    builder.push(" created_at DESC");

    let limit = if filter.limit > 0 { filter.limit } else { MAX_PAGE_SIZE };
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset.max(0));

    let orders = builder.build_query_as::<Order>().fetch_all(database.pool()).await?;
    Ok(orders)
}
