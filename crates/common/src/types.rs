//! Universal types shared across all provider modules.
//!
//! Every module converts its provider-specific data into these types.
//! The aggregator, CLI and any other presentation layer consume only these.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::TokenId;
use crate::constants::NATIVE_DECIMALS;

/// Where a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    CoinGecko,
    DefiLlama,
    /// Copied from the native coin (wrapped-native tokens).
    Mirror,
    /// No trustworthy price was obtained.
    None,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::CoinGecko => write!(f, "coingecko"),
            PriceSource::DefiLlama => write!(f, "defillama"),
            PriceSource::Mirror => write!(f, "mirror"),
            PriceSource::None => write!(f, "none"),
        }
    }
}

/// A priced observation of one token, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub price: f64,
    /// 24h change in percent, when the provider reports it.
    #[serde(default)]
    pub change_24h: Option<f64>,
    pub source: PriceSource,
    /// Unix seconds.
    #[serde(rename = "timestamp")]
    pub observed_at: f64,
}

impl PriceEntry {
    pub fn new(price: f64, change_24h: Option<f64>, source: PriceSource, observed_at: f64) -> Self {
        Self {
            price,
            change_24h,
            source,
            observed_at,
        }
    }

    /// Zero price tagged `none`: "we asked and got nothing usable".
    pub fn unpriced(observed_at: f64) -> Self {
        Self::new(0.0, None, PriceSource::None, observed_at)
    }

    pub fn age_secs(&self, now: f64) -> f64 {
        now - self.observed_at
    }

    pub fn is_fresh(&self, now: f64, ttl_secs: u64) -> bool {
        self.age_secs(now) <= ttl_secs as f64
    }

    pub fn has_price(&self) -> bool {
        self.price > 0.0
    }
}

/// Token → price map as persisted by the price cache.
pub type PriceMap = BTreeMap<TokenId, PriceEntry>;

/// Token → price map as returned by a single provider call.
pub type PriceBatch = HashMap<TokenId, PriceEntry>;

/// Native coin quote.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NativeQuote {
    pub price: f64,
    pub change_24h: Option<f64>,
}

/// Raw per-token quote as read off the wire, before ceiling checks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawQuote {
    pub usd: Option<f64>,
    pub change_24h: Option<f64>,
}

/// Outcome of one upstream price request for a chunk of tokens.
#[derive(Debug, Clone)]
pub enum ChunkResponse {
    /// Quotes keyed by the lower-cased contract address the provider echoed.
    Quotes(HashMap<String, RawQuote>),
    /// HTTP 429.
    RateLimited,
    /// Anything else: transport error, non-success status, bad payload.
    Failed(String),
}

/// A metadata field that was either read from the contract or defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Found(T),
    Fallback(T),
}

impl<T> Field<T> {
    pub fn value(&self) -> &T {
        match self {
            Field::Found(v) | Field::Fallback(v) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Field::Found(v) | Field::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Field::Fallback(_))
    }

    /// Found when `result` is Ok, fallback to `default` otherwise.
    pub fn from_result<E>(result: Result<T, E>, default: T) -> Self {
        match result {
            Ok(v) => Field::Found(v),
            Err(_) => Field::Fallback(default),
        }
    }
}

/// Per-token metadata + raw balance, each field resolved independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub token: TokenId,
    pub symbol: Field<String>,
    pub name: Field<String>,
    pub decimals: Field<u8>,
    pub raw_balance: Field<u128>,
}

impl TokenMetadata {
    pub fn human_balance(&self) -> f64 {
        human_balance(*self.raw_balance.value(), *self.decimals.value())
    }

    /// True when every field fell back to its default.
    pub fn is_fully_degraded(&self) -> bool {
        self.symbol.is_fallback()
            && self.name.is_fallback()
            && self.decimals.is_fallback()
            && self.raw_balance.is_fallback()
    }
}

/// Convert a raw integer amount to display units.
///
/// A token reporting zero decimals yields 0.0: an exponent of zero from an
/// ERC-20 that otherwise looks fungible is treated as invalid data.
pub fn human_balance(raw: u128, decimals: u8) -> f64 {
    if decimals == 0 {
        return 0.0;
    }
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Convert wei to ether.
pub fn wei_to_native(wei: u128) -> f64 {
    wei as f64 / 10f64.powi(NATIVE_DECIMALS as i32)
}

/// One priced token position in a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub token: TokenId,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Raw integer balance, serialized as a decimal string.
    #[serde(with = "u128_string")]
    pub raw_balance: u128,
    pub balance: f64,
    pub price: PriceEntry,
    pub value_usd: f64,
}

impl TokenHolding {
    pub fn from_metadata(meta: TokenMetadata, price: PriceEntry) -> Self {
        let balance = meta.human_balance();
        let value_usd = balance * price.price;
        Self {
            token: meta.token,
            symbol: meta.symbol.into_value(),
            name: meta.name.into_value(),
            decimals: meta.decimals.into_value(),
            raw_balance: meta.raw_balance.into_value(),
            balance,
            price,
            value_usd,
        }
    }
}

/// Snapshot of a wallet's holdings, produced fresh by every aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub wallet: String,
    pub native_balance: f64,
    pub native_price: f64,
    pub native_change_24h: Option<f64>,
    pub native_value: f64,
    /// Sorted by `value_usd`, descending.
    pub holdings: Vec<TokenHolding>,
    pub total_value: f64,
    pub generated_at: DateTime<Utc>,
}

impl Portfolio {
    /// The zero-valued result for a wallet that could not be queried.
    pub fn empty(wallet: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            wallet: wallet.to_string(),
            native_balance: 0.0,
            native_price: 0.0,
            native_change_24h: None,
            native_value: 0.0,
            holdings: Vec::new(),
            total_value: 0.0,
            generated_at,
        }
    }

    pub fn token_value(&self) -> f64 {
        self.holdings.iter().map(|h| h.value_usd).sum()
    }
}

mod u128_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
