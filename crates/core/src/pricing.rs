//! Chunked pricing engine — turns any [`QuoteSource`] into a [`PriceProvider`].
//!
//! Batching, retry with exponential backoff, the sanity ceiling and
//! zero-filling live here once; quote sources only know how to make a
//! single upstream request.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use folio_common::constants::*;
use folio_common::traits::{PriceProvider, QuoteSource};
use folio_common::types::{ChunkResponse, NativeQuote, PriceBatch, PriceEntry, PriceMap, PriceSource, RawQuote};
use folio_common::TokenId;
use tracing::{debug, error, info, warn};

use crate::cache::now_secs;

/// Batching and validation knobs for [`ChunkedPriceProvider`].
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    /// Contract addresses per upstream request.
    pub chunk_size: usize,
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Wait before retry `n` (0-based) is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Pause between consecutive chunks.
    pub chunk_delay: Duration,
    /// Prices above this are dropped from the result.
    pub max_price: f64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            chunk_size: PRICE_CHUNK_SIZE,
            max_attempts: PRICE_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(PRICE_BACKOFF_BASE_MS),
            chunk_delay: Duration::from_millis(PRICE_CHUNK_DELAY_MS),
            max_price: MAX_TOKEN_PRICE_USD,
        }
    }
}

/// Generic batch price provider over a wire-level quote source.
pub struct ChunkedPriceProvider<S> {
    source: S,
    policy: PricingPolicy,
}

impl<S: QuoteSource> ChunkedPriceProvider<S> {
    pub fn new(source: S, policy: PricingPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Price one chunk, retrying up to `max_attempts`. On final failure every
    /// token of the chunk is recorded as unpriced.
    async fn fetch_chunk(&self, chunk: &[TokenId], now: f64, out: &mut PriceBatch) {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 0..attempts {
            match self.source.quote_chunk(chunk).await {
                ChunkResponse::Quotes(quotes) => {
                    self.absorb(chunk, quotes, now, out);
                    return;
                }
                ChunkResponse::RateLimited => {
                    warn!(
                        source = %self.source.source(),
                        "rate limited (attempt {}/{attempts})",
                        attempt + 1
                    );
                }
                ChunkResponse::Failed(reason) => {
                    warn!(
                        source = %self.source.source(),
                        "price chunk failed (attempt {}/{attempts}): {reason}",
                        attempt + 1
                    );
                }
            }

            if attempt + 1 < attempts {
                let wait = backoff_delay(self.policy.backoff_base, attempt);
                debug!("retrying price chunk in {wait:?}");
                tokio::time::sleep(wait).await;
            }
        }

        error!(
            tokens = chunk.len(),
            "price chunk failed after {attempts} attempts, recording zero prices"
        );
        for token in chunk {
            out.insert(token.clone(), PriceEntry::unpriced(now));
        }
    }

    /// Merge one successful response. Tokens the response does not mention
    /// get a zero entry; implausible prices are left out entirely.
    fn absorb(&self, chunk: &[TokenId], quotes: HashMap<String, RawQuote>, now: f64, out: &mut PriceBatch) {
        let quotes: HashMap<String, RawQuote> = quotes
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        let source = self.source.source();

        for token in chunk {
            let quote = quotes.get(token.as_str()).copied().unwrap_or_default();
            match quote.usd {
                Some(price) if price.is_finite() && price >= 0.0 => {
                    if price > self.policy.max_price {
                        error!(
                            token = %token,
                            "token has invalid price of ${price:.2}, excluding from portfolio"
                        );
                        continue;
                    }
                    let change = quote.change_24h.filter(|c| c.is_finite());
                    out.insert(token.clone(), PriceEntry::new(price, change, source, now));
                }
                Some(price) => {
                    error!(token = %token, "discarding malformed price {price}");
                    out.insert(token.clone(), PriceEntry::unpriced(now));
                }
                None => {
                    debug!(token = %token, "no price returned");
                    out.insert(token.clone(), PriceEntry::unpriced(now));
                }
            }
        }
    }
}

#[async_trait]
impl<S: QuoteSource> PriceProvider for ChunkedPriceProvider<S> {
    fn source(&self) -> PriceSource {
        self.source.source()
    }

    async fn native_price(&self) -> NativeQuote {
        match self.source.quote_native().await {
            Ok(quote) if quote.price.is_finite() && quote.price >= 0.0 => quote,
            Ok(quote) => {
                error!(source = %self.source.source(), "discarding malformed native price {}", quote.price);
                NativeQuote::default()
            }
            Err(e) => {
                error!(source = %self.source.source(), "error getting native price: {e}");
                NativeQuote::default()
            }
        }
    }

    async fn fetch_prices(&self, tokens: &[TokenId]) -> PriceBatch {
        let mut out = PriceBatch::new();
        if tokens.is_empty() {
            return out;
        }
        let now = now_secs();

        let mut seen = HashSet::new();
        let unique: Vec<TokenId> = tokens.iter().filter(|t| seen.insert(*t)).cloned().collect();

        let unsupported: HashSet<TokenId> = self.source.unsupported(&unique).await.into_iter().collect();
        for token in &unsupported {
            warn!(token = %token, source = %self.source.source(), "token not supported, setting price to $0.00");
            out.insert(token.clone(), PriceEntry::unpriced(now));
        }

        let pending: Vec<TokenId> = unique.into_iter().filter(|t| !unsupported.contains(t)).collect();
        info!(
            tokens = pending.len(),
            unsupported = unsupported.len(),
            "fetching token prices"
        );

        for (i, chunk) in pending.chunks(self.policy.chunk_size.max(1)).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.policy.chunk_delay).await;
            }
            self.fetch_chunk(chunk, now, &mut out).await;
        }

        info!(priced = out.values().filter(|e| e.has_price()).count(), total = out.len(), "fetched token prices");
        out
    }
}

/// `base * 2^attempt`, saturating instead of overflowing on large attempt counts.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Give the wrapped-native token the native quote when it has no price of
/// its own, whether that entry came from the cache or this run's fetch.
/// Returns true if the mirror was applied.
pub fn apply_native_mirror(prices: &mut PriceMap, wrapped: &TokenId, native: &NativeQuote, now: f64) -> bool {
    if native.price <= 0.0 {
        return false;
    }
    if prices.get(wrapped).is_some_and(|e| e.has_price()) {
        return false;
    }
    debug!(token = %wrapped, price = native.price, "mirroring native price onto wrapped token");
    prices.insert(
        wrapped.clone(),
        PriceEntry::new(native.price, native.change_24h, PriceSource::Mirror, now),
    );
    true
}
