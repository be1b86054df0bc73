use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};

use crate::sources::PricingError;

/// Provider currency ids, index 1 being the fallback.
pub const CURRENCY_CODES: [(u32, &str); 47] = [
    (1, "USD"),
    (2, "GBP"),
    (3, "EUR"),
    (4, "CHF"),
    (5, "RUB"),
    (6, "PLN"),
    (7, "BRL"),
    (8, "JPY"),
    (9, "NOK"),
    (10, "IDR"),
    (11, "MYR"),
    (12, "PHP"),
    (13, "SGD"),
    (14, "THB"),
    (15, "VND"),
    (16, "KRW"),
    (17, "TRY"),
    (18, "UAH"),
    (19, "MXN"),
    (20, "CAD"),
    (21, "AUD"),
    (22, "NZD"),
    (23, "CNY"),
    (24, "INR"),
    (25, "CLP"),
    (26, "PEN"),
    (27, "COP"),
    (28, "ZAR"),
    (29, "HKD"),
    (30, "TWD"),
    (31, "SAR"),
    (32, "AED"),
    (33, "SEK"),
    (34, "ARS"),
    (35, "ILS"),
    (36, "BYN"),
    (37, "KZT"),
    (38, "KWD"),
    (39, "QAR"),
    (40, "CRC"),
    (41, "UYU"),
    (42, "BGN"),
    (43, "HRK"),
    (44, "CZK"),
    (45, "DKK"),
    (46, "HUF"),
    (47, "RON"),
];

pub const DEFAULT_CURRENCY_ID: u32 = 1;
pub const DEFAULT_CURRENCY: &str = "USD";

/// Provider id for a currency code, falling back to USD for unknown or unset codes
pub fn code_to_id(code: Option<&str>) -> u32 {
    code.and_then(|code| {
        CURRENCY_CODES
            .iter()
            .find(|(_, known)| *known == code)
            .map(|(id, _)| *id)
    })
    .unwrap_or(DEFAULT_CURRENCY_ID)
}

pub fn id_to_code(id: u32) -> Option<&'static str> {
    CURRENCY_CODES
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, code)| *code)
}

/// Source of exchange rates, all quoted against the same base currency.
pub trait RateSource {
    fn get_rate(
        &self,
        code: &str,
    ) -> impl std::future::Future<Output = Result<f64, PricingError>> + Send;
}

/// Memoizes rates for the lifetime of one pricing run, so every currency is
/// requested at most once.
pub struct RateBook<'a, R> {
    source: &'a R,
    rates: HashMap<String, f64>,
}

impl<'a, R: RateSource> RateBook<'a, R> {
    pub fn new(source: &'a R) -> Self {
        Self {
            source,
            rates: HashMap::new(),
        }
    }

    async fn rate(&mut self, code: &str) -> Result<f64, PricingError> {
        if let Some(rate) = self.rates.get(code) {
            return Ok(*rate);
        }

        let rate = self.source.get_rate(code).await?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PricingError::MissingRate(code.to_owned()));
        }

        self.rates.insert(code.to_owned(), rate);
        Ok(rate)
    }

    /// Converts `amount` from one currency into another. Same-currency
    /// conversions return the amount untouched without asking for rates.
    pub async fn convert(&mut self, amount: f64, from: &str, to: &str) -> Result<f64, PricingError> {
        if from == to {
            return Ok(amount);
        }

        let from_rate = self.rate(from).await?;
        let to_rate = self.rate(to).await?;
        let converted = amount / from_rate * to_rate;

        debug!("Converted {} {} to {} {}", amount, from, converted, to);
        Ok(converted)
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

/// Rates documents are reused for this long before being downloaded again
pub const RATES_TTL: Duration = Duration::from_secs(3600);

/// Reads rates from a JSON document shaped like `{"rates": {"EUR": 0.92, ...}}`.
/// The document is downloaded once and shared by all codes until it expires.
pub struct HttpRateSource {
    req_client: Client,
    url: String,
    document: Mutex<Option<(Instant, Arc<HashMap<String, f64>>)>>,
}

impl HttpRateSource {
    pub fn new(url: String) -> Result<Self, PricingError> {
        let Ok(client) = reqwest::ClientBuilder::new().build() else {
            return Err(PricingError::InvalidConfig);
        };

        Ok(Self {
            req_client: client,
            url,
            document: Mutex::new(None),
        })
    }

    async fn rates(&self) -> Result<Arc<HashMap<String, f64>>, PricingError> {
        let mut document = self.document.lock().await;

        if let Some((fetched, rates)) = document.as_ref() {
            if fetched.elapsed() < RATES_TTL {
                return Ok(rates.clone());
            }
        }

        let req = match self.req_client.get(&self.url).send().await {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to request exchange rates: {:?}", e);
                return Err(PricingError::InternalError);
            }
        };

        if req.status().is_server_error() {
            return Err(PricingError::ServerError);
        }

        let res: RatesResponse = match req.json().await {
            Ok(res) => res,
            Err(e) => {
                error!("Failed to parse exchange rates: {:?}", e);
                return Err(PricingError::InternalError);
            }
        };

        let rates = Arc::new(res.rates);
        *document = Some((Instant::now(), rates.clone()));
        Ok(rates)
    }
}

impl RateSource for HttpRateSource {
    async fn get_rate(&self, code: &str) -> Result<f64, PricingError> {
        self.rates()
            .await?
            .get(code)
            .copied()
            .ok_or_else(|| PricingError::MissingRate(code.to_owned()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::CannedServer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed rates that count how often they are asked for
    pub(crate) struct FixedRates {
        pub rates: HashMap<String, f64>,
        pub calls: AtomicUsize,
    }

    impl FixedRates {
        pub fn new(rates: &[(&str, f64)]) -> Self {
            Self {
                rates: rates.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RateSource for FixedRates {
        async fn get_rate(&self, code: &str) -> Result<f64, PricingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates
                .get(code)
                .copied()
                .ok_or_else(|| PricingError::MissingRate(code.to_owned()))
        }
    }

    #[test]
    fn test_codes_and_ids_are_a_bijection() {
        for (id, code) in CURRENCY_CODES {
            assert_eq!(code_to_id(Some(code)), id);
            assert_eq!(id_to_code(id), Some(code));
        }
    }

    #[test]
    fn test_unknown_or_unset_code_defaults_to_usd() {
        assert_eq!(code_to_id(Some("XYZ")), DEFAULT_CURRENCY_ID);
        assert_eq!(code_to_id(None), DEFAULT_CURRENCY_ID);
        assert_eq!(id_to_code(DEFAULT_CURRENCY_ID), Some(DEFAULT_CURRENCY));
        assert_eq!(id_to_code(0), None);
    }

    #[tokio::test]
    async fn test_same_currency_skips_rate_lookup() {
        let rates = FixedRates::new(&[]);
        let mut book = RateBook::new(&rates);

        assert_eq!(book.convert(12.5, "EUR", "EUR").await, Ok(12.5));
        assert_eq!(rates.calls(), 0);
    }

    #[tokio::test]
    async fn test_conversion_goes_through_the_base_rate() {
        let rates = FixedRates::new(&[("USD", 1.0), ("EUR", 0.5), ("GBP", 0.25)]);
        let mut book = RateBook::new(&rates);

        assert_eq!(book.convert(10.0, "EUR", "GBP").await, Ok(5.0));
        assert_eq!(book.convert(4.0, "EUR", "USD").await, Ok(8.0));
        // EUR is memoized, only USD is new
        assert_eq!(rates.calls(), 3);
    }

    #[tokio::test]
    async fn test_rates_document_is_downloaded_once() {
        let server = CannedServer::start(
            "HTTP/1.1 200 OK",
            r#"{"result":"success","rates":{"USD":1.0,"EUR":0.5}}"#,
        )
        .await;
        let rates = HttpRateSource::new(format!("{}/latest/USD", server.url)).unwrap();

        let mut book = RateBook::new(&rates);
        assert_eq!(book.convert(10.0, "EUR", "USD").await, Ok(20.0));

        let mut next_run = RateBook::new(&rates);
        assert_eq!(next_run.convert(1.0, "USD", "EUR").await, Ok(0.5));
        assert_eq!(
            next_run.convert(1.0, "USD", "PLN").await,
            Err(PricingError::MissingRate("PLN".to_owned()))
        );

        assert_eq!(server.requests(), vec!["GET /latest/USD HTTP/1.1".to_owned()]);
    }

    #[tokio::test]
    async fn test_rates_server_error() {
        let server = CannedServer::start("HTTP/1.1 503 Service Unavailable", "{}").await;
        let rates = HttpRateSource::new(server.url.clone()).unwrap();

        assert_eq!(rates.get_rate("EUR").await, Err(PricingError::ServerError));
    }

    #[tokio::test]
    async fn test_missing_rate_is_an_error() {
        let rates = FixedRates::new(&[("USD", 1.0)]);
        let mut book = RateBook::new(&rates);

        assert_eq!(
            book.convert(1.0, "USD", "PLN").await,
            Err(PricingError::MissingRate("PLN".to_owned()))
        );
    }
}
