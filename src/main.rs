//! Location Hub - Binary Entry Point
//!
//! This is the main entry point for the location-hub binary.

use std::sync::Arc;

use location_hub::config::HubConfig;
use location_hub::server;
use location_hub::storage::MemoryStore;
use location_hub::types::HubResult;

#[tokio::main]
async fn main() -> HubResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = HubConfig::from_env()?;
    let store = Arc::new(MemoryStore::with_retention(config.history_retention));

    server::run(config, store).await
}
