use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_number_from_string;
use serde_json::{Map, Value};

use crate::{currency::DEFAULT_CURRENCY, sources::PricingError};

/// An item handed in by the caller. Only the fields pricing cares about are
/// typed, everything else is carried through untouched.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ItemRecord {
    #[serde(rename = "item_name")]
    pub name: Option<String>,
    #[serde(rename = "item_wear_name")]
    pub wear_variant: Option<String>,
    #[serde(rename = "item_moveable", default)]
    pub is_priceable: bool,
    pub pricing: Option<Pricing>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemRecord {
    pub fn new(name: &str, wear_variant: Option<&str>, is_priceable: bool) -> Self {
        Self {
            name: Some(name.to_owned()),
            wear_variant: wear_variant.map(str::to_owned),
            is_priceable,
            ..Default::default()
        }
    }

    /// Name of the item if it takes part in pricing
    pub fn priceable_name(&self) -> Option<&str> {
        match (&self.name, self.is_priceable) {
            (Some(name), true) => Some(name),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    #[serde(rename = "steam_listing")]
    pub listing_price: f64,
}

impl Pricing {
    pub fn new(listing_price: f64) -> Self {
        Self { listing_price }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct SteamPrice {
    #[serde(default)]
    pub last_90d: f64,
}

/// One entry of the price backup, the result of the last successful fetch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEntry {
    #[serde(default)]
    pub steam: SteamPrice,
    /// Epoch millis of the fetch. Entries without one count as stale.
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub timestamp: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_owned()
}

impl CacheEntry {
    pub fn new(listing_price: f64, currency: &str, timestamp: i64) -> Self {
        Self {
            steam: SteamPrice {
                last_90d: listing_price,
            },
            timestamp,
            currency: currency.to_owned(),
        }
    }

    pub fn listing_price(&self) -> f64 {
        self.steam.last_90d
    }
}

/// A price as the provider quoted it, stamped with when the answer arrived
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub listing_price: f64,
    /// Epoch millis
    pub fetched_at: i64,
}

impl Quote {
    pub fn new(listing_price: f64, fetched_at: i64) -> Self {
        Self {
            listing_price,
            fetched_at,
        }
    }
}

/// Outcome of one queued fetch. A failed fetch still carries a (zero) price
/// so the batch can go on, `error` tells the caller not to cache it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResult {
    pub listing_price: f64,
    pub fetched_at: Option<i64>,
    pub error: Option<PricingError>,
}

impl QuoteResult {
    pub fn fetched(quote: Quote) -> Self {
        Self {
            listing_price: quote.listing_price,
            fetched_at: Some(quote.fetched_at),
            error: None,
        }
    }

    pub fn failed(error: PricingError) -> Self {
        Self {
            listing_price: 0.0,
            fetched_at: None,
            error: Some(error),
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_record_fields_survive() {
        let raw = json!({
            "item_name": "AK-47 | Redline",
            "item_wear_name": "Field-Tested",
            "item_moveable": true,
            "item_id": "2931",
            "stickers": [1, 2],
        });

        let mut record: ItemRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.priceable_name(), Some("AK-47 | Redline"));
        assert_eq!(record.extra["item_id"], json!("2931"));

        record.pricing = Some(Pricing::new(4.2));
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["pricing"], json!({ "steam_listing": 4.2 }));
        assert_eq!(out["stickers"], json!([1, 2]));
    }

    #[test]
    fn test_unpriced_record_has_no_pricing_field() {
        let record = ItemRecord::new("Desk Lamp", None, false);
        let out = serde_json::to_value(&record).unwrap();

        assert!(out.get("pricing").is_none());
        assert!(record.priceable_name().is_none());
    }

    #[test]
    fn test_legacy_backup_entry_defaults() {
        let entry: CacheEntry = serde_json::from_value(json!({
            "steam": { "last_90d": 1.5 },
            "timestamp": "1700000000000",
        }))
        .unwrap();

        assert_eq!(entry.listing_price(), 1.5);
        assert_eq!(entry.timestamp, 1_700_000_000_000);
        assert_eq!(entry.currency, "USD");

        let entry: CacheEntry = serde_json::from_value(json!({ "steam": {} })).unwrap();
        assert_eq!(entry.timestamp, 0);
        assert_eq!(entry.listing_price(), 0.0);
    }
}
