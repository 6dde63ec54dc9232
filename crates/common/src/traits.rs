//! Provider traits — every data module implements one or more of these.
//!
//! This is the contract between core and modules. The aggregator is written
//! once against [`BalanceProvider`], [`TokenMetadataResolver`] and
//! [`PriceProvider`]; concrete strategies are picked at configuration time.
//!
//! The aggregator-facing traits are infallible by contract: each
//! implementation logs upstream failures and returns the documented
//! degraded default instead.

use async_trait::async_trait;

use crate::address::{Address, TokenId};
use crate::error::FolioResult;
use crate::types::{ChunkResponse, NativeQuote, PriceBatch, PriceSource, TokenMetadata};

/// Native balance + held-token discovery.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Provider identifier, for logs.
    fn name(&self) -> &'static str;

    /// Native balance in display units. 0.0 on any failure.
    async fn native_balance(&self, wallet: &Address) -> f64;

    /// Tokens the wallet (probably) holds, deduplicated, in discovery order.
    /// Empty on any failure.
    async fn held_tokens(&self, wallet: &Address) -> Vec<TokenId>;
}

/// Per-token symbol / name / decimals / balance.
#[async_trait]
pub trait TokenMetadataResolver: Send + Sync {
    /// Each field is resolved independently; failures fall back per field.
    async fn resolve(&self, wallet: &Address, token: &TokenId) -> TokenMetadata;
}

/// Batch USD pricing.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn source(&self) -> PriceSource;

    /// Native coin price. Zero quote on failure.
    async fn native_price(&self) -> NativeQuote;

    /// Prices for `tokens`. Empty input returns an empty map without any
    /// network call. Every requested token appears in the result unless its
    /// price was rejected as implausible.
    async fn fetch_prices(&self, tokens: &[TokenId]) -> PriceBatch;
}

/// Wire-level quote endpoint used by the chunked pricing engine.
///
/// Implementations perform exactly one upstream request per call; batching,
/// retry and validation live above this seam.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn source(&self) -> PriceSource;

    async fn quote_native(&self) -> FolioResult<NativeQuote>;

    async fn quote_chunk(&self, chunk: &[TokenId]) -> ChunkResponse;

    /// Tokens the source cannot price at all, so they are not sent upstream.
    /// Default: none.
    async fn unsupported(&self, _tokens: &[TokenId]) -> Vec<TokenId> {
        Vec::new()
    }
}
