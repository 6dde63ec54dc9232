//! DeFiLlama quote source — keyless `coins.llama.fi` current prices.
//!
//! DeFiLlama reports no 24h change on this endpoint, so every quote carries
//! `change_24h: None`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use folio_common::traits::QuoteSource;
use folio_common::types::{ChunkResponse, NativeQuote, PriceSource, RawQuote};
use folio_common::{FolioError, FolioResult, TokenId};

const LLAMA_API_BASE: &str = "https://coins.llama.fi";

/// Chain prefix of DeFiLlama coin keys.
const CHAIN: &str = "ethereum";

/// Native asset key (DeFiLlama proxies CoinGecko ids).
const NATIVE_KEY: &str = "coingecko:ethereum";

#[derive(Deserialize, Debug, Clone)]
pub struct PricesResponse {
    #[serde(default)]
    pub coins: HashMap<String, LlamaCoin>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LlamaCoin {
    pub price: Option<f64>,
}

pub struct DefiLlamaSource {
    http: Client,
    base_url: String,
}

impl DefiLlamaSource {
    pub fn new(timeout: Duration) -> FolioResult<Self> {
        Self::with_base_url(LLAMA_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> FolioResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FolioError::Config(format!("Failed to build DeFiLlama HTTP client: {e}")))?;

        info!("DeFiLlama source initialized");

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn current_prices(&self, keys: &[String]) -> FolioResult<PricesResponse> {
        let url = format!("{}/prices/current/{}", self.base_url, keys.join(","));

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FolioError::Network(format!("DeFiLlama request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FolioError::RateLimited("DeFiLlama 429".into()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FolioError::upstream("defillama", format!("HTTP {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| FolioError::Decode(format!("DeFiLlama response: {e}")))
    }
}

#[async_trait]
impl QuoteSource for DefiLlamaSource {
    fn source(&self) -> PriceSource {
        PriceSource::DefiLlama
    }

    async fn quote_native(&self) -> FolioResult<NativeQuote> {
        let resp = self.current_prices(&[NATIVE_KEY.to_string()]).await?;
        let price = resp
            .coins
            .get(NATIVE_KEY)
            .and_then(|c| c.price)
            .ok_or_else(|| FolioError::Decode("DeFiLlama: no native price".into()))?;
        Ok(NativeQuote { price, change_24h: None })
    }

    async fn quote_chunk(&self, chunk: &[TokenId]) -> ChunkResponse {
        let keys: Vec<String> = chunk.iter().map(|t| format!("{CHAIN}:{}", t.as_str())).collect();
        debug!(tokens = chunk.len(), "requesting DeFiLlama prices");

        match self.current_prices(&keys).await {
            Ok(resp) => ChunkResponse::Quotes(quotes_from(resp)),
            Err(FolioError::RateLimited(_)) => ChunkResponse::RateLimited,
            Err(e) => ChunkResponse::Failed(e.to_string()),
        }
    }
}

/// Strip the `ethereum:` prefix and lower-case. Keys for other chains are
/// ignored.
pub fn quotes_from(resp: PricesResponse) -> HashMap<String, RawQuote> {
    let prefix = format!("{CHAIN}:");
    resp.coins
        .into_iter()
        .filter_map(|(key, coin)| {
            let addr = key.strip_prefix(&prefix)?.to_ascii_lowercase();
            Some((addr, RawQuote { usd: coin.price, change_24h: None }))
        })
        .collect()
}
