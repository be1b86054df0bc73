use std::sync::Arc;

use log::{error, info};
use market_pricer::{
    cache::PriceBackup,
    config::Config,
    currency::HttpRateSource,
    db::Database,
    pipeline::PricingPipeline,
    queue::RateLimitedQueue,
    sources::{steam::SteamMarket, PricingError},
    types::ItemRecord,
};

async fn price_file(items_path: &str, config: Config) -> Result<Vec<ItemRecord>, PricingError> {
    let market = SteamMarket::new(config.app_id)?;
    let rates = HttpRateSource::new(config.rates_url)?;
    let settings = Database::open(&config.redis_url)?;

    let pipeline = PricingPipeline::start(
        market,
        rates,
        settings,
        PriceBackup::new(config.backup_path),
        Arc::new(RateLimitedQueue::new(config.queue)),
    )
    .await;

    let raw = tokio::fs::read(items_path)
        .await
        .map_err(|e| PricingError::Storage(e.to_string()))?;
    let mut records: Vec<ItemRecord> =
        serde_json::from_slice(&raw).map_err(|e| PricingError::Storage(e.to_string()))?;

    let summary = pipeline.handle_items(&mut records).await;
    info!("Finished pricing {}: {:?}", items_path, summary);

    if let Err(e) = pipeline.flush().await {
        error!("Failed to flush prices on shutdown: {}", e);
    }

    Ok(records)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let Some(items_path) = std::env::args().nth(1) else {
        error!("Usage: market-pricer <items.json>");
        std::process::exit(2);
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let records = match price_file(&items_path, config).await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to price {}: {}", items_path, e);
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&records) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize priced records: {:?}", e);
            std::process::exit(1);
        }
    }
}
