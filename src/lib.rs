pub mod cache;
pub mod config;
pub mod currency;
pub mod db;
pub mod event;
pub mod item_key;
pub mod pipeline;
pub mod price;
pub mod queue;
pub mod sources;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;
