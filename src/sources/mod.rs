pub mod steam;

use std::fmt;

use self::steam::types::PriceOverview;

#[derive(Debug, Clone, PartialEq)]
pub enum PricingError {
    ServerError,
    InternalError,
    InvalidConfig,
    /// The provider answered but flagged the lookup as unsuccessful
    ProviderFailure,
    MissingRate(String),
    Storage(String),
}

impl fmt::Display for PricingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingError::ServerError => write!(f, "price provider returned a server error"),
            PricingError::InternalError => write!(f, "request to price provider failed"),
            PricingError::InvalidConfig => write!(f, "invalid pricing configuration"),
            PricingError::ProviderFailure => write!(f, "price provider reported failure"),
            PricingError::MissingRate(code) => write!(f, "no exchange rate for {}", code),
            PricingError::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for PricingError {}

pub trait PriceSource {
    /// Looks up the market overview of one item, quoted in the provider
    /// currency with the given numeric id.
    fn get_price_overview(
        &self,
        market_name: &str,
        currency_id: u32,
    ) -> impl std::future::Future<Output = Result<PriceOverview, PricingError>> + Send;
}
