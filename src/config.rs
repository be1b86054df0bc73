use std::{path::PathBuf, time::Duration};

use log::error;

use crate::{
    queue::{QueuePolicy, QUEUE_CONCURRENCY, QUEUE_INTERVAL_MS},
    sources::PricingError,
};

const DEFAULT_BACKUP_PATH: &str = "backup/prices.json";
const DEFAULT_APP_ID: u32 = 730;
const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub redis_url: String,
    pub backup_path: PathBuf,
    pub app_id: u32,
    pub rates_url: String,
    pub queue: QueuePolicy,
}

impl Config {
    /// Reads the configuration from the environment, `.env` included
    pub fn from_env() -> Result<Self, PricingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, PricingError> {
        let Some(redis_url) = var("REDIS_URL") else {
            error!("REDIS_URL not set in .env");
            return Err(PricingError::InvalidConfig);
        };

        Ok(Self {
            redis_url,
            backup_path: var("PRICES_BACKUP_PATH")
                .unwrap_or_else(|| DEFAULT_BACKUP_PATH.to_owned())
                .into(),
            app_id: parse_or(&var, "STEAM_APP_ID", DEFAULT_APP_ID)?,
            rates_url: var("EXCHANGE_RATE_URL").unwrap_or_else(|| DEFAULT_RATES_URL.to_owned()),
            queue: QueuePolicy {
                concurrency: parse_or(&var, "PRICING_QUEUE_CONCURRENCY", QUEUE_CONCURRENCY)?,
                interval: Duration::from_millis(parse_or(
                    &var,
                    "PRICING_QUEUE_INTERVAL_MS",
                    QUEUE_INTERVAL_MS,
                )?),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, PricingError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            error!("{} is not valid: {:?}", key, raw);
            PricingError::InvalidConfig
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("REDIS_URL", "redis://127.0.0.1/")])).unwrap();

        assert_eq!(config.backup_path, PathBuf::from("backup/prices.json"));
        assert_eq!(config.app_id, 730);
        assert_eq!(config.queue, QueuePolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("REDIS_URL", "redis://127.0.0.1/"),
            ("STEAM_APP_ID", "440"),
            ("PRICING_QUEUE_CONCURRENCY", "3"),
            ("PRICING_QUEUE_INTERVAL_MS", "5000"),
        ]))
        .unwrap();

        assert_eq!(config.app_id, 440);
        assert_eq!(config.queue.concurrency, 3);
        assert_eq!(config.queue.interval, Duration::from_millis(5000));
    }

    #[test]
    fn test_missing_redis_or_bad_number_is_rejected() {
        assert_eq!(Config::from_lookup(lookup(&[])), Err(PricingError::InvalidConfig));
        assert_eq!(
            Config::from_lookup(lookup(&[("REDIS_URL", "redis://x/"), ("STEAM_APP_ID", "csgo")])),
            Err(PricingError::InvalidConfig)
        );
    }
}
