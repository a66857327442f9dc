mod config;
mod controllers;
mod logging;
mod model;
mod services;
#[cfg(test)]
mod testing;
mod utils;

use anyhow::Result;
use config::Config;
use controllers::app_controller::App;
use controllers::worker_controller::WorkerDeps;
use services::http_service::HttpListener;
use services::persistence_service::{CancellationStore, PgCancellationStore};
use services::queue_service::RedisQueue;
use services::rail_service::NationalRailService;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    logging::init_logger()?;

    // Load configuration, secrets may live in .env
    dotenvy::dotenv().ok();
    let config = Config::load()?;
    logging::set_level(&config.logging.level);

    let store = Arc::new(PgCancellationStore::connect(&config.database).await?);
    store.migrate().await?;

    let lookup = Arc::new(NationalRailService::new(config.national_rail.clone())?);
    let queue = Arc::new(RedisQueue::connect(&config.queue, config.workers.count).await?);

    let deps = WorkerDeps {
        queue,
        lookup,
        store: store.clone(),
    };
    let mut app = App::new(deps, HttpListener::new(&config.http));
    app.setup_workers(config.workers.count);

    // Blocks until SIGINT/SIGTERM has drained the listener and every worker
    let outcome = app.run().await;

    if let Err(e) = store.close().await {
        log::warn!("Failed to close database: {}", e);
    }
    outcome
}
