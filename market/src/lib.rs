pub mod api;
pub mod database;
pub mod exchange;
pub mod notifier;

use crate::exchange::Exchange;
use std::{net::SocketAddr, sync::Arc};
use tokio::{task, task::JoinHandle};
use warp::Filter;

pub fn serve_task(exchange: Arc<Exchange>, address: SocketAddr) -> JoinHandle<()> {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS", "PUT", "PATCH"])
        .allow_headers(vec!["Origin", "Content-Type"]);
    let filter = api::handle_all_routes(exchange).with(cors);
    tracing::info!(%address, "serving market exchange");
    task::spawn(warp::serve(filter).bind(address))
}
