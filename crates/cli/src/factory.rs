//! Service factory — wires the configured providers into the aggregator.
//!
//! Lives in `cli` because `core` must NOT depend on protocol modules
//! (that would create circular deps).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use folio_common::traits::{BalanceProvider, PriceProvider};
use folio_core::config::{ApiTier, DiscoveryMode, FolioConfig, PriceBackend};
use folio_core::{ChunkedPriceProvider, PortfolioAggregator, PortfolioService};
use folio_mod_alchemy::{Erc20Resolver, RpcClient};
use folio_mod_coingecko::{CoinGeckoSource, CoinGeckoTier};
use folio_mod_defillama::DefiLlamaSource;
use folio_mod_etherscan::EtherscanClient;

/// Build the query service from a loaded config.
pub fn from_config(config: &FolioConfig) -> Result<PortfolioService> {
    let rpc = Arc::new(RpcClient::new(&config.rpc_url, config.http_timeout())?);

    let balances = balance_provider(config, rpc.clone())?;
    let metadata = Arc::new(Erc20Resolver::new(rpc));
    let prices = price_provider(config)?;

    let aggregator = PortfolioAggregator::new(
        balances,
        metadata,
        prices,
        config.price_cache(),
        config.aggregator_policy(),
    );
    Ok(PortfolioService::new(aggregator, config.provider_status()))
}

/// Load config from the environment and build the service.
pub fn from_env() -> Result<PortfolioService> {
    let config = FolioConfig::from_env().context("loading configuration")?;
    from_config(&config)
}

fn balance_provider(config: &FolioConfig, rpc: Arc<RpcClient>) -> Result<Arc<dyn BalanceProvider>> {
    match config.discovery {
        DiscoveryMode::Rpc => {
            info!("using JSON-RPC token discovery");
            Ok(rpc as Arc<dyn BalanceProvider>)
        }
        DiscoveryMode::Transfers => {
            let settings = config
                .etherscan
                .as_ref()
                .context("transfer discovery needs ETHERSCAN_API_KEY")?;
            let client = EtherscanClient::new(
                &settings.api_url,
                &settings.api_key,
                config.transfer_window,
                config.http_timeout(),
            )?;
            info!(window = config.transfer_window, "using transfer-history token discovery");
            Ok(Arc::new(client) as Arc<dyn BalanceProvider>)
        }
    }
}

fn price_provider(config: &FolioConfig) -> Result<Arc<dyn PriceProvider>> {
    let policy = config.pricing_policy();
    match config.price_backend {
        PriceBackend::CoinGecko => {
            let settings = config
                .coingecko
                .as_ref()
                .context("CoinGecko pricing needs COINGECKO_API_KEY")?;
            let tier = match settings.tier {
                ApiTier::Pro => CoinGeckoTier::Pro,
                ApiTier::Demo => CoinGeckoTier::Demo,
            };
            let source = CoinGeckoSource::new(&settings.api_key, tier, config.http_timeout(), settings.platform_filter)?;
            info!("using CoinGecko pricing");
            Ok(Arc::new(ChunkedPriceProvider::new(source, policy)) as Arc<dyn PriceProvider>)
        }
        PriceBackend::DefiLlama => {
            let source = DefiLlamaSource::new(config.http_timeout())?;
            info!("using DeFiLlama pricing");
            Ok(Arc::new(ChunkedPriceProvider::new(source, policy)) as Arc<dyn PriceProvider>)
        }
    }
}
