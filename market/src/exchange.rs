//! The facade composing `Database` and `Notifier` into the operations the API surface calls.
//! Every write path that can produce a fill or a cancellation dispatches its notifications here,
//! after the owning transaction has committed.

use crate::database::{ledger, matcher, orders, registry, Database};
use crate::notifier::{notify, Notifier};
use model::error::CoreError;
use model::ids::{MarketId, OrderId, OwnerId, TenantId};
use model::item::ItemBalance;
use model::market::{Market, MarketUpdate, NewMarket};
use model::notification::{user_recipient, NotificationKind, OrderCancelledPayload};
use model::order::{NewOrder, Order, OrderFilter, OrderUpdate};
use model::payload::Payload;
use model::transaction::{AggregateQuery, TransactionAggregate};
use shared::maintenance::Maintaining;
use std::sync::Arc;

/// Identifies this process to the Notifier as the message's sender.
const SENDER: &str = "market";

pub struct Exchange {
    database: Database,
    notifier: Arc<dyn Notifier>,
}

impl Exchange {
    pub fn new(database: Database, notifier: Arc<dyn Notifier>) -> Self {
        Self { database, notifier }
    }

    pub async fn get_balance(
        &self,
        tenant_id: TenantId,
        owner_id: OwnerId,
        market_id: MarketId,
        name: &str,
        payload: &Payload,
    ) -> Result<i64, CoreError> {
        ledger::get_balance(self.database.pool(), tenant_id, owner_id, market_id, name, payload).await
    }

    pub async fn list_balances(
        &self,
        tenant_id: TenantId,
        owner_id: OwnerId,
        market_id: MarketId,
    ) -> Result<Vec<ItemBalance>, CoreError> {
        ledger::list_balances(self.database.pool(), tenant_id, owner_id, market_id).await
    }

    pub async fn batch_update(
        &self,
        tenant_id: TenantId,
        owner_id: OwnerId,
        market_id: MarketId,
        items: &[ledger::BatchDelta],
    ) -> Result<(), CoreError> {
        ledger::batch_update(&self.database, tenant_id, owner_id, market_id, items).await
    }

    /// Posts a new order, escrowing as requested, then immediately sweeps the book for matches.
    /// Returns the new order's id together with whether it was fully consumed by that sweep.
    pub async fn post_order(
        &self,
        tenant_id: TenantId,
        owner_id: OwnerId,
        market_id: MarketId,
        new_order: &NewOrder,
    ) -> Result<(OrderId, bool), CoreError> {
        let order_id = orders::post_order(&self.database, tenant_id, owner_id, market_id, new_order).await?;
        let fully_consumed = self.run_match(tenant_id, market_id, order_id).await?;
        Ok((order_id, fully_consumed))
    }

    pub async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order, CoreError> {
        orders::get_order(self.database.pool(), tenant_id, order_id).await
    }

    pub async fn query_orders(
        &self,
        tenant_id: TenantId,
        market_id: MarketId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, CoreError> {
        orders::query(&self.database, tenant_id, market_id, filter).await
    }

    /// Edits an order's editable fields, then re-runs the matcher in case the edit newly makes it
    /// satisfiable against the existing book.
    pub async fn update_order(
        &self,
        tenant_id: TenantId,
        owner_id: OwnerId,
        market_id: MarketId,
        order_id: OrderId,
        update: &OrderUpdate,
    ) -> Result<Order, CoreError> {
        let order = orders::update_order(&self.database, tenant_id, owner_id, order_id, update).await?;
        self.run_match(tenant_id, market_id, order.order_id).await?;
        orders::get_order(self.database.pool(), tenant_id, order_id).await
    }

    /// Cancels an order on behalf of `owner_id`, refunding its escrow and notifying the owner.
    /// Rejected with `Forbidden` if `owner_id` does not own the order (there is no elevated-scope
    /// override in this core).
    pub async fn delete_order(&self, tenant_id: TenantId, owner_id: OwnerId, order_id: OrderId) -> Result<(), CoreError> {
        let order = orders::delete_order_as_owner(&self.database, tenant_id, owner_id, order_id).await?;
        let were_available = order.available;
        self.notify_cancelled(tenant_id, &order, were_available).await;
        Ok(())
    }

    /// Account deletion cascade, scoped to `tenant_id`: every order the account owns within that
    /// tenant is cancelled (escrow refunded, owner notified), then every ledger row it holds
    /// within that tenant is deleted.
    pub async fn delete_account(&self, tenant_id: TenantId, owner_id: OwnerId) -> Result<(), CoreError> {
        let deleted_orders = orders::delete_orders_by_owner(&self.database, tenant_id, owner_id).await?;
        for order in &deleted_orders {
            let were_available = order.available;
            self.notify_cancelled(tenant_id, order, were_available).await;
        }
        ledger::delete_items_by_owner(self.database.pool(), tenant_id, owner_id).await?;
        Ok(())
    }

    /// Account deletion cascade, unscoped: every order the account owns across every tenant is
    /// cancelled (escrow refunded, owner notified), then every ledger row it holds across every
    /// tenant is deleted.
    pub async fn delete_account_global(&self, owner_id: OwnerId) -> Result<(), CoreError> {
        let deleted_orders = orders::delete_orders_by_owner_global(&self.database, owner_id).await?;
        for order in &deleted_orders {
            let were_available = order.available;
            self.notify_cancelled(order.tenant_id, order, were_available).await;
        }
        ledger::delete_items_by_owner_global(self.database.pool(), owner_id).await?;
        Ok(())
    }

    /// Directed fulfillment: `buyer_id` fills `count` units of `order_id` out of their own
    /// inventory. `None` means nothing happened (order unavailable or buyer lacked funds).
    pub async fn fulfill_order_with_account(
        &self,
        tenant_id: TenantId,
        market_id: MarketId,
        order_id: OrderId,
        buyer_id: OwnerId,
        count: i64,
    ) -> Result<Option<bool>, CoreError> {
        let outcome = matcher::fulfill_order_with_account(&self.database, tenant_id, market_id, order_id, buyer_id, count).await?;
        match outcome {
            Some(outcome) => {
                let (class, key) = user_recipient(outcome.completion.owner_id);
                notify(
                    self.notifier.as_ref(),
                    tenant_id,
                    class,
                    &key,
                    SENDER,
                    NotificationKind::OrderCompleted,
                    &outcome.completion.payload,
                )
                .await;
                Ok(Some(outcome.fully_consumed))
            }
            None => Ok(None),
        }
    }

    pub async fn new_market(&self, tenant_id: TenantId, new_market: &NewMarket) -> Result<MarketId, CoreError> {
        registry::new_market(&self.database, tenant_id, new_market).await
    }

    pub async fn get_market(&self, tenant_id: TenantId, market_id: MarketId) -> Result<Market, CoreError> {
        registry::get_market(&self.database, tenant_id, market_id).await
    }

    pub async fn list_markets(&self, tenant_id: TenantId) -> Result<Vec<Market>, CoreError> {
        registry::list_markets(&self.database, tenant_id).await
    }

    pub async fn update_market(
        &self,
        tenant_id: TenantId,
        market_id: MarketId,
        update: &MarketUpdate,
    ) -> Result<Market, CoreError> {
        registry::update_market(&self.database, tenant_id, market_id, update).await
    }

    pub async fn delete_market(&self, tenant_id: TenantId, market_id: MarketId) -> Result<(), CoreError> {
        registry::delete_market(&self.database, tenant_id, market_id).await
    }

    pub async fn list_aggregated_transactions(
        &self,
        tenant_id: TenantId,
        market_id: MarketId,
        query: &AggregateQuery,
    ) -> Result<Vec<TransactionAggregate>, CoreError> {
        crate::database::journal::list_aggregated(&self.database, tenant_id, market_id, query).await
    }

    async fn run_match(&self, tenant_id: TenantId, market_id: MarketId, order_id: OrderId) -> Result<bool, CoreError> {
        let outcome = matcher::match_order(&self.database, tenant_id, market_id, order_id).await?;
        for completion in outcome.completions {
            let (class, key) = user_recipient(completion.owner_id);
            notify(
                self.notifier.as_ref(),
                tenant_id,
                class,
                &key,
                SENDER,
                NotificationKind::OrderCompleted,
                &completion.payload,
            )
            .await;
        }
        Ok(outcome.fully_consumed)
    }

    async fn notify_cancelled(&self, tenant_id: TenantId, order: &Order, were_available: i64) {
        let payload = OrderCancelledPayload {
            order_id: order.order_id,
            give_name: order.give_name.clone(),
            give_amount: order.give_amount,
            give_payload: order.give_payload.clone(),
            take_name: order.take_name.clone(),
            take_amount: order.take_amount,
            take_payload: order.take_payload.clone(),
            were_available,
            payload: order.payload.clone(),
        };
        let (class, key) = user_recipient(order.owner_id);
        notify(
            self.notifier.as_ref(),
            tenant_id,
            class,
            &key,
            SENDER,
            NotificationKind::OrderCancelled,
            &payload,
        )
        .await;
    }
}

/// Drives the deadline reaper: every order whose deadline has passed is cancelled (refunding
/// escrow and notifying), with per-order errors logged and isolated so one bad row never aborts
/// the sweep.
#[async_trait::async_trait]
impl Maintaining for Exchange {
    async fn run_maintenance(&self) -> anyhow::Result<()> {
        let expired: Vec<(TenantId, OrderId)> =
            sqlx::query_as("SELECT tenant_id, order_id FROM orders WHERE deadline < now()")
                .fetch_all(self.database.pool())
                .await?;

        for (tenant_id, order_id) in expired {
            match orders::delete_order(&self.database, tenant_id, order_id).await {
                Ok(order) => {
                    let were_available = order.available;
                    self.notify_cancelled(tenant_id, &order, were_available).await;
                }
                Err(err) => {
                    tracing::error!(%tenant_id, %order_id, ?err, "reaper failed to cancel expired order");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use model::market::NewMarket;
    use model::order::NewOrder;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(NotificationKind, Value)>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            _tenant_id: TenantId,
            _recipient_class: &str,
            _recipient_key: &str,
            _sender: &str,
            kind: NotificationKind,
            payload: Value,
        ) {
            self.sent.lock().unwrap().push((kind, payload));
        }
    }

    async fn exchange_with_recorder() -> (Exchange, Arc<RecordingNotifier>) {
        let database = crate::database::Database::new("postgresql://", StdDuration::from_secs(10)).unwrap();
        database.clear().await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        (Exchange::new(database, notifier.clone()), notifier)
    }

    fn sample_order(give_amount: i64, take_amount: i64, deadline: chrono::DateTime<chrono::Utc>) -> NewOrder {
        NewOrder {
            give_name: "bread".to_string(),
            give_payload: model::payload::empty_payload(),
            give_amount,
            take_name: "coin".to_string(),
            take_payload: model::payload::empty_payload(),
            take_amount,
            available: 1,
            payload: model::payload::empty_payload(),
            deadline,
            subtract_items: true,
        }
    }

    /// Scenario 6: once an order's deadline has passed, a reaper tick deletes it, refunds the
    /// full escrow, and emits exactly one `order_cancelled` notification.
    #[tokio::test]
    #[ignore]
    async fn reaper_cancels_expired_orders_and_refunds_escrow() {
        let (exchange, notifier) = exchange_with_recorder().await;
        let tenant_id = TenantId(1);
        let owner_id = OwnerId(1);
        let market_id = exchange
            .new_market(tenant_id, &NewMarket { name: "reaper".to_string(), settings: model::payload::empty_payload() })
            .await
            .unwrap();

        ledger::add(exchange.database.pool(), tenant_id, owner_id, market_id, "bread", &model::payload::empty_payload(), 10)
            .await
            .unwrap();
        let near_future = chrono::Utc::now() + chrono::Duration::seconds(1);
        let (order_id, _) = exchange
            .post_order(tenant_id, owner_id, market_id, &sample_order(10, 1, near_future))
            .await
            .unwrap();

        // Nudge the deadline into the past without waiting a second in the test.
        sqlx::query("UPDATE orders SET deadline = now() - interval '1 second' WHERE tenant_id = $1 AND order_id = $2")
            .bind(tenant_id)
            .bind(order_id)
            .execute(exchange.database.pool())
            .await
            .unwrap();

        exchange.run_maintenance().await.unwrap();

        assert!(matches!(
            exchange.get_order(tenant_id, order_id).await,
            Err(err) if err.kind == model::error::ErrorKind::NotFound
        ));
        let refunded = exchange.get_balance(tenant_id, owner_id, market_id, "bread", &model::payload::empty_payload()).await.unwrap();
        assert_eq!(refunded, 10);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NotificationKind::OrderCancelled);
    }

    /// Posting a compatible counter-order through the facade runs the matcher end-to-end and
    /// dispatches both sides' `order_completed` notifications.
    #[tokio::test]
    #[ignore]
    async fn post_order_runs_matcher_and_notifies_both_sides() {
        let (exchange, notifier) = exchange_with_recorder().await;
        let tenant_id = TenantId(2);
        let alice = OwnerId(1);
        let bob = OwnerId(2);
        let market_id = exchange
            .new_market(tenant_id, &NewMarket { name: "swap".to_string(), settings: model::payload::empty_payload() })
            .await
            .unwrap();

        ledger::add(exchange.database.pool(), tenant_id, alice, market_id, "bread", &model::payload::empty_payload(), 10)
            .await
            .unwrap();
        ledger::add(exchange.database.pool(), tenant_id, bob, market_id, "coin", &model::payload::empty_payload(), 1)
            .await
            .unwrap();

        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        exchange.post_order(tenant_id, alice, market_id, &sample_order(10, 1, future)).await.unwrap();
        let mut counter = sample_order(1, 10, future);
        counter.give_name = "coin".to_string();
        counter.take_name = "bread".to_string();
        let (_, fulfilled_immediately) = exchange.post_order(tenant_id, bob, market_id, &counter).await.unwrap();

        assert!(fulfilled_immediately);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(kind, _)| *kind == NotificationKind::OrderCompleted));
    }

    /// Deleting an account cancels every order it owns within that tenant (notifying for each)
    /// and clears its ledger rows, but leaves another tenant's rows for the same owner untouched.
    #[tokio::test]
    #[ignore]
    async fn delete_account_cascades_orders_and_ledger_within_tenant() {
        let (exchange, notifier) = exchange_with_recorder().await;
        let tenant_id = TenantId(3);
        let other_tenant_id = TenantId(4);
        let owner_id = OwnerId(1);
        let market_id = exchange
            .new_market(tenant_id, &NewMarket { name: "cascade".to_string(), settings: model::payload::empty_payload() })
            .await
            .unwrap();
        let other_market_id = exchange
            .new_market(other_tenant_id, &NewMarket { name: "cascade".to_string(), settings: model::payload::empty_payload() })
            .await
            .unwrap();

        ledger::add(exchange.database.pool(), tenant_id, owner_id, market_id, "bread", &model::payload::empty_payload(), 10)
            .await
            .unwrap();
        ledger::add(exchange.database.pool(), other_tenant_id, owner_id, other_market_id, "bread", &model::payload::empty_payload(), 5)
            .await
            .unwrap();

        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        let (order_id, _) = exchange
            .post_order(tenant_id, owner_id, market_id, &sample_order(4, 1, future))
            .await
            .unwrap();

        exchange.delete_account(tenant_id, owner_id).await.unwrap();

        assert!(matches!(
            exchange.get_order(tenant_id, order_id).await,
            Err(err) if err.kind == model::error::ErrorKind::NotFound
        ));
        assert_eq!(
            exchange.get_balance(tenant_id, owner_id, market_id, "bread", &model::payload::empty_payload()).await.unwrap(),
            0
        );
        assert_eq!(
            exchange.get_balance(other_tenant_id, owner_id, other_market_id, "bread", &model::payload::empty_payload()).await.unwrap(),
            5
        );
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NotificationKind::OrderCancelled);
    }

    /// The global cascade clears an owner's orders and ledger rows across every tenant.
    #[tokio::test]
    #[ignore]
    async fn delete_account_global_cascades_across_tenants() {
        let (exchange, _notifier) = exchange_with_recorder().await;
        let tenant_id = TenantId(5);
        let other_tenant_id = TenantId(6);
        let owner_id = OwnerId(1);
        let market_id = exchange
            .new_market(tenant_id, &NewMarket { name: "global-a".to_string(), settings: model::payload::empty_payload() })
            .await
            .unwrap();
        let other_market_id = exchange
            .new_market(other_tenant_id, &NewMarket { name: "global-b".to_string(), settings: model::payload::empty_payload() })
            .await
            .unwrap();

        ledger::add(exchange.database.pool(), tenant_id, owner_id, market_id, "bread", &model::payload::empty_payload(), 10)
            .await
            .unwrap();
        ledger::add(exchange.database.pool(), other_tenant_id, owner_id, other_market_id, "coin", &model::payload::empty_payload(), 5)
            .await
            .unwrap();

        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        exchange.post_order(tenant_id, owner_id, market_id, &sample_order(4, 1, future)).await.unwrap();

        exchange.delete_account_global(owner_id).await.unwrap();

        assert_eq!(
            exchange.get_balance(tenant_id, owner_id, market_id, "bread", &model::payload::empty_payload()).await.unwrap(),
            0
        );
        assert_eq!(
            exchange.get_balance(other_tenant_id, owner_id, other_market_id, "coin", &model::payload::empty_payload()).await.unwrap(),
            0
        );
        let orders = exchange.query_orders(tenant_id, market_id, &OrderFilter::default()).await.unwrap();
        assert!(orders.is_empty());
    }
}
