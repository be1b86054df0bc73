use serde::{Deserialize, Serialize};

use crate::types::ItemRecord;

/// What kind of batch a pricing run was started for
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RunKind {
    Inventory,
    TradeUp,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum PricingEvent {
    /// A run finished; every record of the batch is included, priced or not
    #[serde(rename = "pricing-complete")]
    Completed(PricingComplete),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PricingComplete {
    pub kind: RunKind,
    pub records: Vec<ItemRecord>,
}
