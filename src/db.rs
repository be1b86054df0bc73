use std::{collections::HashMap, sync::Mutex};

use log::{error, info};
use redis::{AsyncCommands, Client};
use serde_json::Value;

use crate::sources::PricingError;

/// Preferred currency code, e.g. `"EUR"`
pub const CURRENCY_KEY: &str = "pricing.currency";
/// Canonical key to the pricing attached during the latest runs
pub const CACHE_KEY: &str = "pricing.cache";

/// Key-value store for user settings. Values are arbitrary JSON.
pub trait SettingsStore {
    fn get_value(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Value>, PricingError>> + Send;

    fn set_value(
        &self,
        key: &str,
        value: Value,
    ) -> impl std::future::Future<Output = Result<(), PricingError>> + Send;
}

#[derive(Clone)]
pub struct Database {
    client: Client,
}

impl Database {
    pub fn open(url: &str) -> Result<Self, PricingError> {
        let client = match Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to open redis client: {:?}", e);
                return Err(PricingError::InvalidConfig);
            }
        };

        info!("Using redis settings store at {}", url);

        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, PricingError> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(con) => Ok(con),
            Err(e) => {
                error!("Failed to get connection to redis: {:?}", e);
                Err(PricingError::Storage(e.to_string()))
            }
        }
    }
}

impl SettingsStore for Database {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, PricingError> {
        let mut con = self.connection().await?;

        let raw: Option<String> = match con.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to get {} from redis: {:?}", key, e);
                return Err(PricingError::Storage(e.to_string()));
            }
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PricingError::Storage(e.to_string()))
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), PricingError> {
        let mut con = self.connection().await?;

        match con.set::<_, _, ()>(key, value.to_string()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Failed to store {} in redis: {:?}", key, e);
                Err(PricingError::Storage(e.to_string()))
            }
        }
    }
}

/// Settings kept in process memory, for tests and runs without redis
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySettings {
    pub fn with_value(key: &str, value: Value) -> Self {
        let settings = Self::default();
        if let Ok(mut values) = settings.values.lock() {
            values.insert(key.to_owned(), value);
        }
        settings
    }
}

impl SettingsStore for MemorySettings {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, PricingError> {
        match self.values.lock() {
            Ok(values) => Ok(values.get(key).cloned()),
            Err(e) => Err(PricingError::Storage(e.to_string())),
        }
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), PricingError> {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_owned(), value);
                Ok(())
            }
            Err(e) => Err(PricingError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_settings_round_trip() {
        let settings = MemorySettings::with_value(CURRENCY_KEY, json!("EUR"));

        assert_eq!(settings.get_value(CURRENCY_KEY).await, Ok(Some(json!("EUR"))));
        assert_eq!(settings.get_value(CACHE_KEY).await, Ok(None));

        settings
            .set_value(CACHE_KEY, json!({ "a": { "steam_listing": 1.0 } }))
            .await
            .unwrap();
        assert_eq!(
            settings.get_value(CACHE_KEY).await,
            Ok(Some(json!({ "a": { "steam_listing": 1.0 } })))
        );
    }

    #[test]
    fn test_bad_redis_url_is_a_config_error() {
        assert!(matches!(Database::open("not a url"), Err(PricingError::InvalidConfig)));
    }
}
