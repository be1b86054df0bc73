use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};

use crate::{
    cache::{FreshnessCache, Lookup, PriceBackup},
    currency::{code_to_id, id_to_code, RateBook, RateSource, DEFAULT_CURRENCY},
    db::{SettingsStore, CACHE_KEY, CURRENCY_KEY},
    event::{PricingComplete, PricingEvent, RunKind},
    item_key::canonical_key,
    queue::RateLimitedQueue,
    sources::{PriceSource, PricingError},
    types::{CacheEntry, ItemRecord, Pricing, Quote},
};

const EVENT_CAPACITY: usize = 16;

/// How the unique keys of one run were resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub hits: usize,
    pub converted: usize,
    pub fetched: usize,
    pub failed: usize,
}

/// Prices batches of item records.
///
/// Equal items are looked up once, fresh prices come from the cache and the
/// rest is fetched through the shared rate limited queue. Every run ends
/// with the cache written back to its backup file and a
/// [`PricingEvent::Completed`] broadcast.
pub struct PricingPipeline<S, R, K> {
    source: S,
    rates: R,
    settings: K,
    queue: Arc<RateLimitedQueue>,
    cache: Mutex<FreshnessCache>,
    backup: PriceBackup,
    persist_lock: Mutex<()>,
    events: broadcast::Sender<PricingEvent>,
}

impl<S, R, K> PricingPipeline<S, R, K>
where
    S: PriceSource + Send + Sync,
    R: RateSource + Send + Sync,
    K: SettingsStore + Send + Sync,
{
    /// Builds the pipeline, loading whatever the backup file holds
    pub async fn start(
        source: S,
        rates: R,
        settings: K,
        backup: PriceBackup,
        queue: Arc<RateLimitedQueue>,
    ) -> Self {
        let cache = backup.restore().await;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            source,
            rates,
            settings,
            queue,
            cache: Mutex::new(cache),
            backup,
            persist_lock: Mutex::new(()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PricingEvent> {
        self.events.subscribe()
    }

    /// The queue all fetches go through, for sharing with other pipelines
    pub fn queue(&self) -> Arc<RateLimitedQueue> {
        self.queue.clone()
    }

    pub async fn cache_snapshot(&self) -> FreshnessCache {
        self.cache.lock().await.clone()
    }

    /// Stores the wallet currency as the preferred one, unless the user
    /// already picked a currency.
    pub async fn init_currency_preference(&self, wallet_currency_id: u32) {
        match self.settings.get_value(CURRENCY_KEY).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let code = id_to_code(wallet_currency_id).unwrap_or(DEFAULT_CURRENCY);
                if let Err(e) = self.settings.set_value(CURRENCY_KEY, Value::from(code)).await {
                    warn!("Failed to store currency preference: {:?}", e);
                }
            }
            Err(e) => warn!("Failed to read currency preference: {:?}", e),
        }
    }

    /// Swaps the whole price map for one handed in from elsewhere
    pub async fn set_prices(&self, entries: BTreeMap<String, CacheEntry>, origin: &str) {
        info!("Price map of {} entries set by {}", entries.len(), origin);
        *self.cache.lock().await = FreshnessCache::new(entries);
    }

    pub async fn handle_items(&self, records: &mut [ItemRecord]) -> RunSummary {
        self.run(RunKind::Inventory, records).await
    }

    pub async fn handle_trade_up(&self, records: &mut [ItemRecord]) -> RunSummary {
        self.run(RunKind::TradeUp, records).await
    }

    /// Writes the current cache to the backup file, meant for shutdown
    pub async fn flush(&self) -> Result<(), PricingError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.cache.lock().await.clone();
        self.backup.persist(&snapshot).await
    }

    /// Attaches a price to every priceable record of the batch.
    ///
    /// Records without a name or that are not priceable are left alone.
    /// Nothing in here fails the run; a price that can't be determined is 0.
    pub async fn run(&self, kind: RunKind, records: &mut [ItemRecord]) -> RunSummary {
        let mut summary = RunSummary::default();
        let started = Instant::now();
        let now = Utc::now().timestamp_millis();
        let currency = self.currency_preference().await;
        let currency_id = code_to_id(Some(currency.as_str()));

        // Keys are derived once, so lookup, fetch and merge all agree on them
        let keys = {
            let cache = self.cache.lock().await;
            let keys: Vec<Option<String>> = records
                .iter()
                .map(|record| {
                    record.priceable_name().map(|name| {
                        canonical_key(name, record.wear_variant.as_deref(), |key| {
                            cache.contains(key)
                        })
                    })
                })
                .collect();
            keys
        };

        let mut seen = HashSet::new();
        let unique: Vec<&String> = keys.iter().flatten().filter(|key| seen.insert(*key)).collect();

        let mut prices: HashMap<String, f64> = HashMap::new();
        let mut to_convert = Vec::new();
        let mut to_fetch = Vec::new();

        {
            let cache = self.cache.lock().await;
            for key in unique {
                match cache.lookup(key, &currency, now) {
                    Lookup::Hit(price) => {
                        debug!("Used backup for {}", key);
                        summary.hits += 1;
                        prices.insert(key.clone(), price);
                    }
                    Lookup::Convert {
                        listing_price,
                        currency: from,
                    } => to_convert.push((key.clone(), listing_price, from)),
                    Lookup::Miss => to_fetch.push(key.clone()),
                }
            }
        }

        let mut book = RateBook::new(&self.rates);
        for (key, listing_price, from) in to_convert {
            let price = match book.convert(listing_price, &from, &currency).await {
                Ok(price) => {
                    summary.converted += 1;
                    price
                }
                Err(e) => {
                    warn!("Failed to convert cached price of {} from {}: {}", key, from, e);
                    summary.failed += 1;
                    0.0
                }
            };
            prices.insert(key, price);
        }

        let results = join_all(to_fetch.iter().map(|key| {
            self.queue
                .enqueue(key, move || self.fetch_price(key, currency_id, now, started))
        }))
        .await;

        {
            let mut cache = self.cache.lock().await;
            for (key, result) in to_fetch.into_iter().zip(results) {
                match result.fetched_at {
                    Some(fetched_at) if result.is_fetched() => {
                        summary.fetched += 1;
                        cache.store(&key, result.listing_price, &currency, fetched_at);
                    }
                    _ => summary.failed += 1,
                }
                prices.insert(key, result.listing_price);
            }
        }

        let mut attached = BTreeMap::new();
        for (record, key) in records.iter_mut().zip(keys) {
            let Some(key) = key else {
                continue;
            };
            let pricing = Pricing::new(prices.get(&key).copied().unwrap_or(0.0));
            record.pricing = Some(pricing);
            attached.insert(key, pricing);
        }

        self.persist(&attached).await;

        info!(
            "Priced {} records ({} cached, {} converted, {} fetched, {} failed)",
            attached.len(),
            summary.hits,
            summary.converted,
            summary.fetched,
            summary.failed
        );

        let event = PricingEvent::Completed(PricingComplete {
            kind,
            records: records.to_vec(),
        });
        if self.events.send(event).is_err() {
            debug!("No listeners for pricing results");
        }

        summary
    }

    /// Fetches one price and stamps it with the moment the answer arrived.
    /// The stamp is the run's wall clock start advanced by the runtime clock,
    /// so it follows the queue pacing exactly.
    async fn fetch_price(
        &self,
        key: &str,
        currency_id: u32,
        run_started_at: i64,
        started: Instant,
    ) -> Result<Quote, PricingError> {
        let overview = self.source.get_price_overview(key, currency_id).await?;
        let fetched_at = run_started_at.saturating_add(started.elapsed().as_millis() as i64);

        Ok(Quote::new(overview.listing_price()?, fetched_at))
    }

    async fn currency_preference(&self) -> String {
        let code = match self.settings.get_value(CURRENCY_KEY).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read currency preference: {:?}", e);
                None
            }
        };

        // unknown codes are priced in the fallback currency, so cache them as such
        let id = code_to_id(code.as_ref().and_then(Value::as_str));
        id_to_code(id).unwrap_or(DEFAULT_CURRENCY).to_owned()
    }

    async fn persist(&self, attached: &BTreeMap<String, Pricing>) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.cache.lock().await.clone();

        match self.backup.persist(&snapshot).await {
            Ok(()) => info!("Saved updated prices to backup"),
            Err(e) => error!("Failed to save prices backup {:?}: {}", self.backup.path(), e),
        }

        if attached.is_empty() {
            return;
        }

        let mut blob = match self.settings.get_value(CACHE_KEY).await {
            Ok(Some(Value::Object(blob))) => blob,
            Ok(_) => Map::new(),
            Err(e) => {
                warn!("Failed to read settings price cache: {:?}", e);
                Map::new()
            }
        };

        for (key, pricing) in attached {
            match serde_json::to_value(pricing) {
                Ok(value) => {
                    blob.insert(key.clone(), value);
                }
                Err(e) => warn!("Failed to serialize pricing of {}: {:?}", key, e),
            }
        }

        if let Err(e) = self.settings.set_value(CACHE_KEY, Value::Object(blob)).await {
            error!("Failed to save settings price cache: {:?}", e);
        }
    }
}
