use serde::{Deserialize, Serialize};

use crate::{price::clean_price, sources::PricingError};

/// Share of the lowest price used when an item trades but has no usable
/// listing price
pub const THIN_MARKET_FACTOR: f64 = 0.8;

/// Answer of the market `priceoverview` endpoint
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PriceOverview {
    pub success: bool,
    pub lowest_price: Option<String>,
    pub median_price: Option<String>,
    pub volume: Option<StrIntValue>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum StrIntValue {
    Int(u64),
    Float(f64),
    Str(String),
}

impl From<&StrIntValue> for u64 {
    fn from(value: &StrIntValue) -> u64 {
        match value {
            StrIntValue::Int(i) => *i,
            StrIntValue::Float(f) => *f as u64,
            // the market groups thousands, e.g. "1,234"
            StrIntValue::Str(s) => s
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0),
        }
    }
}

impl PriceOverview {
    pub fn volume(&self) -> u64 {
        self.volume.as_ref().map(u64::from).unwrap_or(0)
    }

    /// The price an item is worth according to this overview.
    ///
    /// The lowest listing wins, then the median. Items that trade without
    /// either resolving to a price fall back to 80% of the lowest price.
    pub fn listing_price(&self) -> Result<f64, PricingError> {
        if !self.success {
            return Err(PricingError::ProviderFailure);
        }

        let lowest = clean_price(self.lowest_price.as_deref());
        let median = clean_price(self.median_price.as_deref());

        let mut price = if lowest != 0.0 { lowest } else { median };

        if price == 0.0 && self.volume() > 0 {
            price = lowest * THIN_MARKET_FACTOR;
        }

        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overview(raw: serde_json::Value) -> PriceOverview {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_lowest_price_wins() {
        let res = overview(json!({
            "success": true,
            "lowest_price": "$1,234.56",
            "median_price": "$1,100.00",
            "volume": "1,024",
        }));

        assert_eq!(res.volume(), 1024);
        assert_eq!(res.listing_price(), Ok(1234.56));
    }

    #[test]
    fn test_median_when_no_listing() {
        let res = overview(json!({ "success": true, "median_price": "2,50€" }));
        assert_eq!(res.listing_price(), Ok(2.5));
    }

    #[test]
    fn test_volume_without_prices_is_zero() {
        let res = overview(json!({ "success": true, "volume": 50 }));

        assert_eq!(res.volume(), 50);
        assert_eq!(res.listing_price(), Ok(0.0));
    }

    #[test]
    fn test_unsuccessful_lookup_is_a_provider_failure() {
        let res = overview(json!({ "success": false, "lowest_price": "$1.00" }));
        assert_eq!(res.listing_price(), Err(PricingError::ProviderFailure));
    }
}
