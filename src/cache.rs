use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{error, info, warn};

use crate::{sources::PricingError, types::CacheEntry};

/// Prices younger than a day are reused as is
pub const PRICE_TTL_MS: i64 = 86_400_000;

/// What the cache knows about one key
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Fresh and quoted in the requested currency
    Hit(f64),
    /// Fresh, but quoted in `currency` and needs converting before use
    Convert { listing_price: f64, currency: String },
    /// Absent or stale, has to be fetched
    Miss,
}

/// Last known price per canonical item key.
///
/// Entries are only ever overwritten, never removed. A stale entry simply
/// stops being used until the next successful fetch replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreshnessCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl FreshnessCache {
    pub fn new(entries: BTreeMap<String, CacheEntry>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, CacheEntry> {
        &self.entries
    }

    pub fn lookup(&self, key: &str, currency: &str, now: i64) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Miss;
        };

        if now.saturating_sub(entry.timestamp) >= PRICE_TTL_MS {
            return Lookup::Miss;
        }

        if entry.currency == currency {
            Lookup::Hit(entry.listing_price())
        } else {
            Lookup::Convert {
                listing_price: entry.listing_price(),
                currency: entry.currency.clone(),
            }
        }
    }

    /// Overwrites whatever was stored under `key`
    pub fn store(&mut self, key: &str, listing_price: f64, currency: &str, now: i64) {
        self.entries
            .insert(key.to_owned(), CacheEntry::new(listing_price, currency, now));
    }
}

/// The JSON file the cache survives restarts in
#[derive(Debug, Clone)]
pub struct PriceBackup {
    path: PathBuf,
}

impl PriceBackup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the backup. A missing or unreadable file gives an empty cache.
    pub async fn restore(&self) -> FreshnessCache {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No price backup at {:?}, starting empty", self.path);
                return FreshnessCache::default();
            }
            Err(e) => {
                warn!("Failed to read price backup {:?}: {:?}", self.path, e);
                return FreshnessCache::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(entries) => {
                let cache = FreshnessCache::new(entries);
                info!("Loaded {} prices from backup", cache.len());
                cache
            }
            Err(e) => {
                warn!("Failed to parse price backup {:?}: {:?}", self.path, e);
                FreshnessCache::default()
            }
        }
    }

    /// Writes the whole cache next to the backup and renames it into place, so
    /// an interrupted write leaves the previous file intact.
    pub async fn persist(&self, cache: &FreshnessCache) -> Result<(), PricingError> {
        let json = match serde_json::to_vec_pretty(cache.entries()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize price backup: {:?}", e);
                return Err(PricingError::Storage(e.to_string()));
            }
        };

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PricingError::Storage(e.to_string()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PricingError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PricingError::Storage(e.to_string()))?;

        Ok(())
    }
}
