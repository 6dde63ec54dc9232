pub mod client;

pub use client::{CoinGeckoSource, CoinGeckoTier};
