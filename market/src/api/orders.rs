use super::common::{core_error_reply, extract_payload, ok_json, resolve_market, Caller};
use crate::exchange::Exchange;
use chrono::{DateTime, Utc};
use model::ids::OrderId;
use model::order::{Comparator, NewOrder, Order, OrderFilter, OrderSort};
use model::payload::{empty_payload, Payload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

#[derive(Serialize)]
struct OrdersResponse {
    orders: Vec<Order>,
}

/// Query-string-friendly subset of `OrderFilter`: the HTTP surface is an external collaborator
/// and does not attempt to expose the payload-subset filters over flat query parameters.
#[derive(Debug, Deserialize, Default)]
struct OrdersQuery {
    owner_id: Option<model::ids::OwnerId>,
    give_name: Option<String>,
    take_name: Option<String>,
    give_amount: Option<i64>,
    give_amount_comparator: Option<Comparator>,
    take_amount: Option<i64>,
    take_amount_comparator: Option<Comparator>,
    sort_by: Option<OrderSort>,
    #[serde(default)]
    sort_descending: bool,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

impl From<OrdersQuery> for OrderFilter {
    fn from(query: OrdersQuery) -> Self {
        OrderFilter {
            owner_id: query.owner_id,
            give_name: query.give_name,
            give_payload: None,
            give_amount: query.give_amount,
            give_amount_comparator: query.give_amount_comparator,
            take_name: query.take_name,
            take_payload: None,
            take_amount: query.take_amount,
            take_amount_comparator: query.take_amount_comparator,
            sort_by: query.sort_by,
            sort_descending: query.sort_descending,
            offset: query.offset,
            limit: query.limit,
        }
    }
}

pub fn get_orders(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "orders")
        .and(warp::get())
        .and(warp::query::<Caller>())
        .and(warp::query::<OrdersQuery>())
        .then(move |name: String, caller: Caller, query: OrdersQuery| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    exchange.query_orders(caller.tenant_id, market_id, &query.into()).await
                }
                .await;
                match result {
                    Ok(orders) => ok_json(&OrdersResponse { orders }),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

pub fn get_my_orders(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "orders" / "my")
        .and(warp::get())
        .and(warp::query::<Caller>())
        .then(move |name: String, caller: Caller| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    let filter = OrderFilter { owner_id: Some(caller.owner_id), limit: 1000, ..Default::default() };
                    exchange.query_orders(caller.tenant_id, market_id, &filter).await
                }
                .await;
                match result {
                    Ok(orders) => ok_json(&OrdersResponse { orders }),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

pub fn get_order_by_id(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "orders" / OrderId)
        .and(warp::get())
        .and(warp::query::<Caller>())
        .then(move |_name: String, order_id: OrderId, caller: Caller| {
            let exchange = exchange.clone();
            async move {
                match exchange.get_order(caller.tenant_id, order_id).await {
                    Ok(order) => ok_json(&order),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

#[derive(Deserialize)]
struct PostOrderBody {
    give_name: String,
    #[serde(default = "empty_payload")]
    give_payload: Payload,
    give_amount: i64,
    take_name: String,
    #[serde(default = "empty_payload")]
    take_payload: Payload,
    take_amount: i64,
    #[serde(rename = "orders_amount")]
    available: i64,
    #[serde(default = "empty_payload")]
    payload: Payload,
    deadline: DateTime<Utc>,
    #[serde(default = "default_true")]
    subtract_items: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct PostOrderResponse {
    order_id: OrderId,
    fulfilled_immediately: bool,
}

pub fn post_order(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "orders")
        .and(warp::post())
        .and(warp::query::<Caller>())
        .and(extract_payload::<PostOrderBody>())
        .then(move |name: String, caller: Caller, body: PostOrderBody| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    let new_order = NewOrder {
                        give_name: body.give_name,
                        give_payload: body.give_payload,
                        give_amount: body.give_amount,
                        take_name: body.take_name,
                        take_payload: body.take_payload,
                        take_amount: body.take_amount,
                        available: body.available,
                        payload: body.payload,
                        deadline: body.deadline,
                        subtract_items: body.subtract_items,
                    };
                    exchange.post_order(caller.tenant_id, caller.owner_id, market_id, &new_order).await
                }
                .await;
                match result {
                    Ok((order_id, fulfilled_immediately)) => {
                        ok_json(&PostOrderResponse { order_id, fulfilled_immediately })
                    }
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

#[derive(Deserialize)]
struct FulfillBody {
    amount: i64,
}

#[derive(Serialize)]
struct FulfillResponse {
    order_id: OrderId,
    fulfilled_completely: Option<bool>,
}

pub fn fulfill_order(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "orders" / OrderId / "fulfill")
        .and(warp::post())
        .and(warp::query::<Caller>())
        .and(extract_payload::<FulfillBody>())
        .then(move |name: String, order_id: OrderId, caller: Caller, body: FulfillBody| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    exchange
                        .fulfill_order_with_account(caller.tenant_id, market_id, order_id, caller.owner_id, body.amount)
                        .await
                }
                .await;
                match result {
                    Ok(fulfilled_completely) => ok_json(&FulfillResponse { order_id, fulfilled_completely }),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

pub fn delete_order(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "orders" / OrderId / "delete")
        .and(warp::post())
        .and(warp::query::<Caller>())
        .then(move |name: String, order_id: OrderId, caller: Caller| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    let order = exchange.get_order(caller.tenant_id, order_id).await?;
                    if order.market_id != market_id {
                        return Err(model::error::CoreError::forbidden(format!(
                            "order {} does not belong to market '{}'",
                            order_id, name
                        )));
                    }
                    exchange.delete_order(caller.tenant_id, caller.owner_id, order_id).await
                }
                .await;
                match result {
                    Ok(()) => ok_json(&serde_json::json!({})),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}
