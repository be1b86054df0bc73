use self::types::PriceOverview;
use crate::sources::PricingError;
use log::{debug, error};
use reqwest::Client;

use super::PriceSource;

const BASE_URL: &str = "https://steamcommunity.com/market";

pub mod types;

#[derive(Clone)]
pub struct SteamMarket {
    req_client: Client,
    base_url: String,
    app_id: u32,
}

impl SteamMarket {
    pub fn new(app_id: u32) -> Result<Self, PricingError> {
        Self::with_base_url(BASE_URL.to_owned(), app_id)
    }

    pub fn with_base_url(base_url: String, app_id: u32) -> Result<Self, PricingError> {
        let Ok(client) = reqwest::ClientBuilder::new().build() else {
            return Err(PricingError::InvalidConfig);
        };

        Ok(Self {
            req_client: client,
            base_url,
            app_id,
        })
    }
}

impl PriceSource for SteamMarket {
    /// Requests the price overview of one item.
    /// The canonical item name is used as the market hash name.
    async fn get_price_overview(
        &self,
        market_name: &str,
        currency_id: u32,
    ) -> Result<PriceOverview, PricingError> {
        let req = match self
            .req_client
            .get(format!("{}/priceoverview/", self.base_url))
            .query(&[
                ("appid", self.app_id.to_string()),
                ("currency", currency_id.to_string()),
                ("market_hash_name", market_name.to_owned()),
            ])
            .send()
            .await
        {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to send request to the Steam market: {:?}", e);
                return Err(PricingError::InternalError);
            }
        };

        if req.status().is_server_error() {
            return Err(PricingError::ServerError);
        }

        if req.status() != 200 {
            error!(
                "Failed to get price from the Steam market: {:?}, {:?}",
                req.status(),
                req.text().await.unwrap_or_default()
            );
            return Err(PricingError::InternalError);
        }

        match req.json::<PriceOverview>().await {
            Ok(res) => {
                debug!("Fetched for {}: {:?}", market_name, res);
                Ok(res)
            }
            Err(e) => {
                error!("Failed to parse JSON from request: {:?}", e);
                Err(PricingError::InternalError)
            }
        }
    }
}
