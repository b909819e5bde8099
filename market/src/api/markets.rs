use super::common::{core_error_reply, ok_json, tenant};
use crate::exchange::Exchange;
use model::payload::Payload;
use serde::Serialize;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

#[derive(Serialize)]
struct MarketResponse {
    settings: Payload,
}

pub fn get_market(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("markets" / String)
        .and(warp::get())
        .and(tenant())
        .then(move |name: String, caller: super::common::TenantOnly| {
            let exchange = exchange.clone();
            async move {
                let result = async {
                    let market_id = super::common::resolve_market(&exchange, caller.tenant_id, &name).await?;
                    exchange.get_market(caller.tenant_id, market_id).await
                }
                .await;
                match result {
                    Ok(market) => ok_json(&MarketResponse { settings: market.settings }),
                    Err(err) => core_error_reply(err),
                }
            }
        })
}
