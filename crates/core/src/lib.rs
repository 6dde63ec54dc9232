pub mod aggregator;
pub mod cache;
pub mod config;
pub mod pricing;
pub mod service;

pub use aggregator::{AggregatorPolicy, PortfolioAggregator, RunStage};
pub use cache::PriceCache;
pub use config::FolioConfig;
pub use pricing::{ChunkedPriceProvider, PricingPolicy};
pub use service::PortfolioService;
