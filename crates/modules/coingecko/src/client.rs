//! CoinGecko quote source — Pro/Demo API.
//!
//! One request per call; retry, chunking and the sanity ceiling are handled
//! by the pricing engine in core.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use folio_common::traits::QuoteSource;
use folio_common::types::{ChunkResponse, NativeQuote, PriceSource, RawQuote};
use folio_common::{FolioError, FolioResult, TokenId};

/// CoinGecko asset platform for Ethereum mainnet.
const PLATFORM: &str = "ethereum";

/// CoinGecko coin id of the native asset.
const NATIVE_ID: &str = "ethereum";

/// CoinGecko API tier — determines base URL and auth header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinGeckoTier {
    /// Demo (free) API: api.coingecko.com/api/v3
    Demo,
    /// Pro (paid) API: pro-api.coingecko.com/api/v3
    Pro,
}

/// Entry of `/coins/list?include_platform=true`.
#[derive(Deserialize, Debug, Clone)]
pub struct CoinListItem {
    #[serde(default)]
    pub platforms: HashMap<String, Option<String>>,
}

pub struct CoinGeckoSource {
    http: Client,
    api_key: String,
    tier: CoinGeckoTier,
    platform_filter: bool,
    /// Ethereum contracts CoinGecko lists, fetched at most once.
    /// `None` inside means the fetch failed and filtering is off.
    supported: OnceCell<Option<HashSet<String>>>,
}

impl CoinGeckoSource {
    pub fn new(api_key: &str, tier: CoinGeckoTier, timeout: Duration, platform_filter: bool) -> FolioResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FolioError::Config(format!("Failed to build CoinGecko HTTP client: {e}")))?;

        info!(tier = ?tier, platform_filter, "CoinGecko source initialized");

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            tier,
            platform_filter,
            supported: OnceCell::new(),
        })
    }

    /// Base URL for CoinGecko v3 API.
    fn base_url(&self) -> &str {
        match self.tier {
            CoinGeckoTier::Demo => "https://api.coingecko.com/api/v3",
            CoinGeckoTier::Pro => "https://pro-api.coingecko.com/api/v3",
        }
    }

    /// Auth header name.
    fn auth_header(&self) -> &str {
        match self.tier {
            CoinGeckoTier::Demo => "x-cg-demo-api-key",
            CoinGeckoTier::Pro => "x-cg-pro-api-key",
        }
    }

    /// Single GET. 429 becomes [`FolioError::RateLimited`].
    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, &str)]) -> FolioResult<T> {
        let resp = self
            .http
            .get(url)
            .header(self.auth_header(), &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| FolioError::Network(format!("CoinGecko request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FolioError::RateLimited("CoinGecko 429".into()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FolioError::upstream("coingecko", format!("HTTP {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| FolioError::Decode(format!("CoinGecko response: {e}")))
    }

    pub async fn coins_list(&self) -> FolioResult<Vec<CoinListItem>> {
        let url = format!("{}/coins/list", self.base_url());
        self.get(&url, &[("include_platform", "true")]).await
    }

    async fn supported_contracts(&self) -> Option<&HashSet<String>> {
        self.supported
            .get_or_init(|| async {
                match self.coins_list().await {
                    Ok(list) => {
                        let set = ethereum_contracts(&list);
                        info!(tokens = set.len(), "loaded CoinGecko token list");
                        Some(set)
                    }
                    Err(e) => {
                        warn!("could not load CoinGecko token list, not filtering: {e}");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoSource {
    fn source(&self) -> PriceSource {
        PriceSource::CoinGecko
    }

    async fn quote_native(&self) -> FolioResult<NativeQuote> {
        let url = format!("{}/simple/price", self.base_url());
        let body: Value = self
            .get(
                &url,
                &[("ids", NATIVE_ID), ("vs_currencies", "usd"), ("include_24hr_change", "true")],
            )
            .await?;
        parse_native_price(&body)
    }

    async fn quote_chunk(&self, chunk: &[TokenId]) -> ChunkResponse {
        let url = format!("{}/simple/token_price/{PLATFORM}", self.base_url());
        let addresses = chunk.iter().map(TokenId::as_str).collect::<Vec<_>>().join(",");
        debug!(tokens = chunk.len(), "requesting CoinGecko token prices");

        let result: FolioResult<Value> = self
            .get(
                &url,
                &[
                    ("contract_addresses", addresses.as_str()),
                    ("vs_currencies", "usd"),
                    ("include_24hr_change", "true"),
                ],
            )
            .await;

        match result.and_then(|body| parse_token_prices(&body)) {
            Ok(quotes) => ChunkResponse::Quotes(quotes),
            Err(FolioError::RateLimited(_)) => ChunkResponse::RateLimited,
            Err(e) => ChunkResponse::Failed(e.to_string()),
        }
    }

    async fn unsupported(&self, tokens: &[TokenId]) -> Vec<TokenId> {
        if !self.platform_filter {
            return Vec::new();
        }
        match self.supported_contracts().await {
            Some(listed) => tokens.iter().filter(|t| !listed.contains(t.as_str())).cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// `{"0xabc": {"usd": 1.0, "usd_24h_change": -0.2}, ...}` → quotes keyed by
/// lower-cased contract.
pub fn parse_token_prices(body: &Value) -> FolioResult<HashMap<String, RawQuote>> {
    let obj = body
        .as_object()
        .ok_or_else(|| FolioError::Decode("CoinGecko token_price: expected object".into()))?;

    Ok(obj
        .iter()
        .map(|(addr, v)| {
            let quote = RawQuote {
                usd: v.get("usd").and_then(Value::as_f64),
                change_24h: v.get("usd_24h_change").and_then(Value::as_f64),
            };
            (addr.to_ascii_lowercase(), quote)
        })
        .collect())
}

/// `{"ethereum": {"usd": 2000.0, "usd_24h_change": 5.0}}`.
pub fn parse_native_price(body: &Value) -> FolioResult<NativeQuote> {
    let price = body
        .pointer(&format!("/{NATIVE_ID}/usd"))
        .and_then(Value::as_f64)
        .ok_or_else(|| FolioError::Decode("CoinGecko simple/price: missing usd".into()))?;
    let change_24h = body
        .pointer(&format!("/{NATIVE_ID}/usd_24h_change"))
        .and_then(Value::as_f64);
    Ok(NativeQuote { price, change_24h })
}

/// Lower-cased Ethereum contract addresses from the coins list.
pub fn ethereum_contracts(list: &[CoinListItem]) -> HashSet<String> {
    list.iter()
        .filter_map(|coin| coin.platforms.get(PLATFORM).cloned().flatten())
        .filter(|addr| !addr.is_empty())
        .map(|addr| addr.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_prices() {
        let body = json!({
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48": { "usd": 0.9998, "usd_24h_change": -0.01 },
            "0x6b175474e89094c44da98b954eedeac495271d0f": { "usd": 1.0 },
            "0xdac17f958d2ee523a2206206994597c13d831ec7": {}
        });
        let quotes = parse_token_prices(&body).unwrap();

        let usdc = &quotes["0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"];
        assert_eq!(usdc.usd, Some(0.9998));
        assert_eq!(usdc.change_24h, Some(-0.01));
        assert_eq!(quotes["0x6b175474e89094c44da98b954eedeac495271d0f"].change_24h, None);
        assert_eq!(quotes["0xdac17f958d2ee523a2206206994597c13d831ec7"].usd, None);
    }

    #[test]
    fn test_parse_token_prices_rejects_non_object() {
        assert!(parse_token_prices(&json!(["nope"])).is_err());
    }

    #[test]
    fn test_parse_native_price() {
        let q = parse_native_price(&json!({ "ethereum": { "usd": 2000.0, "usd_24h_change": 5.0 } })).unwrap();
        assert_eq!(q, NativeQuote { price: 2000.0, change_24h: Some(5.0) });

        assert!(parse_native_price(&json!({ "ethereum": {} })).is_err());
    }

    #[test]
    fn test_ethereum_contracts_from_list() {
        let list: Vec<CoinListItem> = serde_json::from_value(json!([
            { "id": "usd-coin", "symbol": "usdc", "name": "USDC",
              "platforms": { "ethereum": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "solana": "EPj..." } },
            { "id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "platforms": {} },
            { "id": "weird", "symbol": "w", "name": "W", "platforms": { "ethereum": null } },
            { "id": "blank", "symbol": "b", "name": "B", "platforms": { "ethereum": "" } }
        ]))
        .unwrap();

        let set = ethereum_contracts(&list);
        assert_eq!(set.len(), 1);
        assert!(set.contains("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
    }

    #[test]
    fn test_tier_urls() {
        let pro = CoinGeckoSource::new("k", CoinGeckoTier::Pro, Duration::from_secs(5), false).unwrap();
        let demo = CoinGeckoSource::new("k", CoinGeckoTier::Demo, Duration::from_secs(5), false).unwrap();
        assert_eq!(pro.base_url(), "https://pro-api.coingecko.com/api/v3");
        assert_eq!(pro.auth_header(), "x-cg-pro-api-key");
        assert_eq!(demo.base_url(), "https://api.coingecko.com/api/v3");
        assert_eq!(demo.auth_header(), "x-cg-demo-api-key");
    }

    #[tokio::test]
    async fn test_no_filter_means_nothing_unsupported() {
        let source = CoinGeckoSource::new("k", CoinGeckoTier::Demo, Duration::from_secs(5), false).unwrap();
        let token = TokenId::parse("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
        assert!(source.unsupported(&[token]).await.is_empty());
    }
}
