//! Public query surface for presentation layers.
//!
//! Three calls, nothing else: build a portfolio, report which providers are
//! configured, validate an address.

use std::collections::BTreeMap;

use folio_common::types::Portfolio;

use crate::aggregator::PortfolioAggregator;

pub struct PortfolioService {
    aggregator: PortfolioAggregator,
    providers: BTreeMap<String, bool>,
}

impl PortfolioService {
    /// `providers` is the configuration status reported by
    /// [`check_providers_configured`](Self::check_providers_configured).
    pub fn new(aggregator: PortfolioAggregator, providers: BTreeMap<String, bool>) -> Self {
        Self { aggregator, providers }
    }

    pub async fn get_portfolio(&self, wallet: &str) -> Portfolio {
        self.aggregator.aggregate(wallet).await
    }

    pub fn check_providers_configured(&self) -> BTreeMap<String, bool> {
        self.providers.clone()
    }

    pub fn is_valid_address(&self, address: &str) -> bool {
        folio_common::is_valid_address(address)
    }

    pub fn aggregator(&self) -> &PortfolioAggregator {
        &self.aggregator
    }
}
