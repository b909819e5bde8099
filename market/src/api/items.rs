use super::common::{core_error_reply, extract_payload, ok_json, resolve_market, Caller};
use crate::database::ledger::BatchDelta;
use crate::exchange::Exchange;
use model::item::ItemDelta;
use model::payload::{empty_payload, Payload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

#[derive(Serialize)]
struct ItemsResponse {
    items: Vec<model::item::ItemBalance>,
}

pub fn get_items(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "items")
        .and(warp::get())
        .and(warp::query::<Caller>())
        .then(move |name: String, caller: Caller| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    exchange.list_balances(caller.tenant_id, caller.owner_id, market_id).await
                }
                .await;
                match result {
                    Ok(items) => ok_json(&ItemsResponse { items }),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

#[derive(Deserialize)]
struct BatchBody {
    items: Vec<ItemDelta>,
}

pub fn post_items(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "items")
        .and(warp::post())
        .and(warp::query::<Caller>())
        .and(extract_payload::<BatchBody>())
        .then(move |name: String, caller: Caller, body: BatchBody| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    let deltas: Vec<BatchDelta> = body
                        .items
                        .into_iter()
                        .map(|item| BatchDelta { name: item.name, payload: item.payload, delta: item.amount })
                        .collect();
                    exchange.batch_update(caller.tenant_id, caller.owner_id, market_id, &deltas).await
                }
                .await;
                match result {
                    Ok(()) => ok_json(&serde_json::json!({})),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

#[derive(Deserialize)]
struct ItemQuery {
    #[serde(default = "empty_payload")]
    payload: Payload,
}

#[derive(Serialize)]
struct AmountResponse {
    amount: i64,
}

pub fn get_item(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "items" / String)
        .and(warp::get())
        .and(warp::query::<Caller>())
        .and(warp::query::<ItemQuery>())
        .then(move |name: String, item: String, caller: Caller, query: ItemQuery| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    exchange
                        .get_balance(caller.tenant_id, caller.owner_id, market_id, &item, &query.payload)
                        .await
                }
                .await;
                match result {
                    Ok(amount) => ok_json(&AmountResponse { amount }),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}

#[derive(Deserialize)]
struct ItemUpdateBody {
    #[serde(default = "empty_payload")]
    payload: Payload,
    amount: i64,
}

pub fn post_item(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String / "items" / String)
        .and(warp::post())
        .and(warp::query::<Caller>())
        .and(extract_payload::<ItemUpdateBody>())
        .then(move |name: String, item: String, caller: Caller, body: ItemUpdateBody| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = resolve_market(&exchange, caller.tenant_id, &name).await?;
                    let delta = BatchDelta { name: item, payload: body.payload, delta: body.amount };
                    exchange.batch_update(caller.tenant_id, caller.owner_id, market_id, &[delta]).await
                }
                .await;
                match result {
                    Ok(()) => ok_json(&serde_json::json!({})),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}
