//! The HTTP surface. This is an external collaborator by spec (see the module-level note on
//! scope): authentication and scope enforcement are not implemented here, so every handler
//! trusts `tenant_id`/`owner_id` query parameters in place of a decoded bearer token. A real
//! deployment terminates auth in front of this layer.

mod common;
mod items;
mod markets;
mod orders;

use crate::exchange::Exchange;
use std::sync::Arc;
use warp::{Filter, Reply};

pub fn handle_all_routes(exchange: Arc<Exchange>) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let get_market = markets::get_market(exchange.clone());
    let get_items = items::get_items(exchange.clone());
    let post_items = items::post_items(exchange.clone());
    let get_item = items::get_item(exchange.clone());
    let post_item = items::post_item(exchange.clone());
    let get_my_orders = orders::get_my_orders(exchange.clone());
    let get_orders = orders::get_orders(exchange.clone());
    let post_order = orders::post_order(exchange.clone());
    let fulfill_order = orders::fulfill_order(exchange.clone());
    let delete_order = orders::delete_order(exchange.clone());
    let get_order_by_id = orders::get_order_by_id(exchange);

    get_market
        .or(get_my_orders)
        .or(get_orders)
        .or(post_order)
        .or(fulfill_order)
        .or(delete_order)
        .or(get_order_by_id)
        .or(post_items)
        .or(get_items)
        .or(post_item)
        .or(get_item)
}
