//! Configuration — loaded once at startup from the environment (and `.env`).
//!
//! ```text
//! WEB3_PROVIDER_URL=https://eth-mainnet.g.alchemy.com/v2/<key>   (required)
//! COINGECKO_API_KEY=CG-...         (required when FOLIO_PRICE_PROVIDER=coingecko)
//! COINGECKO_TIER=pro|demo          (default pro)
//! COINGECKO_PLATFORM_FILTER=true|false  (default true; skip contracts CoinGecko does not list)
//! ETHERSCAN_API_KEY=...            (required when FOLIO_DISCOVERY=transfers)
//! ETHERSCAN_API_URL=...            (default https://api.etherscan.io/v2/api)
//! FOLIO_DISCOVERY=rpc|transfers    (default rpc)
//! FOLIO_PRICE_PROVIDER=coingecko|defillama
//! ```
//!
//! Everything downstream receives the immutable [`FolioConfig`]; nothing
//! re-reads the environment on the hot path.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use folio_common::constants::*;
use folio_common::{FolioError, FolioResult, TokenId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::AggregatorPolicy;
use crate::cache::PriceCache;
use crate::pricing::PricingPolicy;

const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/v2/api";

/// Upper bound for `FOLIO_PRICE_MAX_ATTEMPTS`; past this the backoff alone runs for days.
const MAX_PRICE_ATTEMPTS: u32 = 10;

/// How held tokens are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// `alchemy_getTokenBalances` over JSON-RPC.
    #[default]
    Rpc,
    /// Recent explorer transfer history + well-known allow-list.
    Transfers,
}

impl FromStr for DiscoveryMode {
    type Err = FolioError;

    fn from_str(s: &str) -> FolioResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(DiscoveryMode::Rpc),
            "transfers" | "history" => Ok(DiscoveryMode::Transfers),
            other => Err(FolioError::Config(format!(
                "FOLIO_DISCOVERY must be 'rpc' or 'transfers', got '{other}'"
            ))),
        }
    }
}

/// Which quote source prices tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceBackend {
    #[default]
    CoinGecko,
    DefiLlama,
}

impl FromStr for PriceBackend {
    type Err = FolioError;

    fn from_str(s: &str) -> FolioResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coingecko" => Ok(PriceBackend::CoinGecko),
            "defillama" | "llama" => Ok(PriceBackend::DefiLlama),
            other => Err(FolioError::Config(format!(
                "FOLIO_PRICE_PROVIDER must be 'coingecko' or 'defillama', got '{other}'"
            ))),
        }
    }
}

/// CoinGecko plan — selects base URL and auth header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiTier {
    #[default]
    Pro,
    Demo,
}

impl FromStr for ApiTier {
    type Err = FolioError;

    fn from_str(s: &str) -> FolioResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pro" => Ok(ApiTier::Pro),
            "demo" | "free" => Ok(ApiTier::Demo),
            other => Err(FolioError::Config(format!(
                "COINGECKO_TIER must be 'pro' or 'demo', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinGeckoSettings {
    pub api_key: String,
    pub tier: ApiTier,
    /// Skip contracts missing from CoinGecko's Ethereum platform list.
    pub platform_filter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtherscanSettings {
    pub api_key: String,
    pub api_url: String,
}

/// Immutable runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    pub coingecko: Option<CoinGeckoSettings>,
    pub etherscan: Option<EtherscanSettings>,
    pub discovery: DiscoveryMode,
    pub price_backend: PriceBackend,
    pub cache_path: PathBuf,
    pub cache_ttl_secs: u64,
    pub max_token_price: f64,
    pub price_chunk_size: usize,
    pub price_max_attempts: u32,
    /// 0 = resolve every token at once.
    pub metadata_batch_size: usize,
    pub metadata_batch_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub transfer_window: usize,
}

impl FolioConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> FolioResult<Self> {
        load_dotenv();
        Self::from_lookup(env_lookup)
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> FolioResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = get("WEB3_PROVIDER_URL")
            .ok_or_else(|| FolioError::Config("WEB3_PROVIDER_URL not set".into()))?;
        validate_url("WEB3_PROVIDER_URL", &rpc_url)?;

        let discovery: DiscoveryMode = get("FOLIO_DISCOVERY")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();
        let price_backend: PriceBackend = get("FOLIO_PRICE_PROVIDER")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        let coingecko = match get("COINGECKO_API_KEY") {
            Some(api_key) => Some(CoinGeckoSettings {
                api_key,
                tier: get("COINGECKO_TIER").map(|v| v.parse::<ApiTier>()).transpose()?.unwrap_or_default(),
                platform_filter: parse_or("COINGECKO_PLATFORM_FILTER", get("COINGECKO_PLATFORM_FILTER"), true)?,
            }),
            None => None,
        };
        if price_backend == PriceBackend::CoinGecko && coingecko.is_none() {
            return Err(FolioError::Config(
                "COINGECKO_API_KEY not set (required by FOLIO_PRICE_PROVIDER=coingecko)".into(),
            ));
        }

        let etherscan = match get("ETHERSCAN_API_KEY") {
            Some(api_key) => {
                let api_url = get("ETHERSCAN_API_URL").unwrap_or_else(|| DEFAULT_ETHERSCAN_URL.into());
                validate_url("ETHERSCAN_API_URL", &api_url)?;
                Some(EtherscanSettings { api_key, api_url })
            }
            None => None,
        };
        if discovery == DiscoveryMode::Transfers && etherscan.is_none() {
            return Err(FolioError::Config(
                "ETHERSCAN_API_KEY not set (required by FOLIO_DISCOVERY=transfers)".into(),
            ));
        }

        let cache_path = match get("FOLIO_CACHE_PATH") {
            Some(p) => PathBuf::from(p),
            None => PriceCache::default_path()
                .unwrap_or_else(|_| PathBuf::from(".folio/data/price_cache.json")),
        };

        let config = Self {
            rpc_url,
            coingecko,
            etherscan,
            discovery,
            price_backend,
            cache_path,
            cache_ttl_secs: parse_or("FOLIO_CACHE_TTL_SECS", get("FOLIO_CACHE_TTL_SECS"), PRICE_CACHE_TTL_SECS)?,
            max_token_price: parse_or("FOLIO_MAX_TOKEN_PRICE", get("FOLIO_MAX_TOKEN_PRICE"), MAX_TOKEN_PRICE_USD)?,
            price_chunk_size: parse_or("FOLIO_PRICE_CHUNK_SIZE", get("FOLIO_PRICE_CHUNK_SIZE"), PRICE_CHUNK_SIZE)?,
            price_max_attempts: parse_or("FOLIO_PRICE_MAX_ATTEMPTS", get("FOLIO_PRICE_MAX_ATTEMPTS"), PRICE_MAX_ATTEMPTS)?,
            metadata_batch_size: parse_or("FOLIO_METADATA_BATCH_SIZE", get("FOLIO_METADATA_BATCH_SIZE"), 0)?,
            metadata_batch_delay_ms: parse_or("FOLIO_METADATA_BATCH_DELAY_MS", get("FOLIO_METADATA_BATCH_DELAY_MS"), 0)?,
            http_timeout_secs: parse_or("FOLIO_HTTP_TIMEOUT_SECS", get("FOLIO_HTTP_TIMEOUT_SECS"), HTTP_TIMEOUT_SECS)?,
            transfer_window: parse_or("FOLIO_TRANSFER_WINDOW", get("FOLIO_TRANSFER_WINDOW"), TRANSFER_HISTORY_WINDOW)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> FolioResult<()> {
        if self.price_chunk_size == 0 {
            return Err(FolioError::Config("FOLIO_PRICE_CHUNK_SIZE must be > 0".into()));
        }
        if self.price_max_attempts == 0 || self.price_max_attempts > MAX_PRICE_ATTEMPTS {
            return Err(FolioError::Config(format!(
                "FOLIO_PRICE_MAX_ATTEMPTS must be between 1 and {MAX_PRICE_ATTEMPTS}"
            )));
        }
        if self.max_token_price.is_nan() || self.max_token_price <= 0.0 {
            return Err(FolioError::Config("FOLIO_MAX_TOKEN_PRICE must be > 0".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(FolioError::Config("FOLIO_HTTP_TIMEOUT_SECS must be > 0".into()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn price_cache(&self) -> PriceCache {
        PriceCache::new(self.cache_path.clone(), self.cache_ttl_secs).with_max_price(self.max_token_price)
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            chunk_size: self.price_chunk_size,
            max_attempts: self.price_max_attempts,
            max_price: self.max_token_price,
            ..PricingPolicy::default()
        }
    }

    pub fn aggregator_policy(&self) -> AggregatorPolicy {
        AggregatorPolicy {
            metadata_batch_size: self.metadata_batch_size,
            metadata_batch_delay: Duration::from_millis(self.metadata_batch_delay_ms),
            wrapped_native: TokenId::parse(WRAPPED_NATIVE_ADDRESS).ok(),
        }
    }

    /// Provider name → configured. Every entry is true for a loaded config
    /// except the optional providers that were left unset.
    pub fn provider_status(&self) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        status.insert(PROVIDER_RPC.to_string(), true);
        status.insert(PROVIDER_COINGECKO.to_string(), self.coingecko.is_some());
        status.insert(PROVIDER_ETHERSCAN.to_string(), self.etherscan.is_some());
        status.insert(PROVIDER_DEFILLAMA.to_string(), true);
        status
    }
}

/// Load `.env` into the process environment, if one exists.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "loaded .env");
    }
}

/// Process-environment lookup for the `*_from_lookup` functions.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Just the price cache settings, for commands that need no providers.
pub fn price_cache_from_lookup<F>(lookup: F) -> FolioResult<PriceCache>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let ttl = parse_or("FOLIO_CACHE_TTL_SECS", get("FOLIO_CACHE_TTL_SECS"), PRICE_CACHE_TTL_SECS)?;
    let max_price = parse_or("FOLIO_MAX_TOKEN_PRICE", get("FOLIO_MAX_TOKEN_PRICE"), MAX_TOKEN_PRICE_USD)?;
    let path = match get("FOLIO_CACHE_PATH") {
        Some(p) => PathBuf::from(p),
        None => PriceCache::default_path()?,
    };
    Ok(PriceCache::new(path, ttl).with_max_price(max_price))
}

/// Provider configuration check that never fails — usable when the full
/// config does not load (e.g. to tell the user which key is missing).
pub fn provider_status_from_lookup<F>(lookup: F) -> BTreeMap<String, bool>
where
    F: Fn(&str) -> Option<String>,
{
    let set = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());
    let mut status = BTreeMap::new();
    status.insert(
        PROVIDER_RPC.to_string(),
        lookup("WEB3_PROVIDER_URL").is_some_and(|v| url::Url::parse(v.trim()).is_ok()),
    );
    status.insert(PROVIDER_COINGECKO.to_string(), set("COINGECKO_API_KEY"));
    status.insert(PROVIDER_ETHERSCAN.to_string(), set("ETHERSCAN_API_KEY"));
    // Keyless.
    status.insert(PROVIDER_DEFILLAMA.to_string(), true);
    status
}

fn validate_url(key: &str, value: &str) -> FolioResult<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| FolioError::Config(format!("{key} is not a valid URL ({e}): {value}")))
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> FolioResult<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| FolioError::Config(format!("{key} has an invalid value: '{raw}'"))),
    }
}
