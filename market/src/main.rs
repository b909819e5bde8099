use market::database::Database;
use market::exchange::Exchange;
use market::notifier::LoggingNotifier;
use shared::arguments::Arguments;
use shared::maintenance::{Maintaining, ServiceMaintenance};
use std::sync::Arc;
use structopt::StructOpt;

#[tokio::main]
async fn main() {
    let args = Arguments::from_args();
    shared::tracing_setup::initialize(args.log_filter.as_str());
    tracing::info!("running market exchange with {:#?}", args);

    let database = Database::new(args.database_url.as_str(), args.db_statement_timeout)
        .expect("failed to set up database pool");
    let notifier = Arc::new(LoggingNotifier);
    let exchange = Arc::new(Exchange::new(database, notifier));

    // The reaper is the only maintained component today, but routing it through
    // `ServiceMaintenance` keeps room for future periodic upkeep tasks without touching the loop.
    let maintenance = Arc::new(ServiceMaintenance { maintainers: vec![exchange.clone()] });

    let serve_task = market::serve_task(exchange, args.bind_address);
    let reaper_task = tokio::task::spawn(reaper_loop(maintenance, args.reaper_interval));

    tokio::select! {
        result = serve_task => tracing::error!(?result, "serve task exited"),
        result = reaper_task => tracing::error!(?result, "reaper task exited"),
    };
}

/// Drives the deadline reaper on a fixed interval (default 60s), cancelling every order whose
/// deadline has passed. Each tick is independently transactional; an error in one tick is logged
/// and never stops the loop.
async fn reaper_loop(maintenance: Arc<dyn Maintaining>, interval: std::time::Duration) -> ! {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        tracing::debug!("running deadline reaper sweep");
        if let Err(err) = maintenance.run_maintenance().await {
            tracing::error!(?err, "reaper sweep failed");
        }
    }
}
