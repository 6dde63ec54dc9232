//! Portfolio aggregator — one wallet in, one consistent snapshot out.
//!
//! ```text
//! init → cache-loaded → native-fetched → tokens-discovered
//!      → prices-reconciled → metadata-resolved → merged-and-sorted → done
//! ```
//!
//! The aggregator never fails: every provider call already degrades to a
//! default, and an invalid wallet yields [`Portfolio::empty`]. The price
//! cache is read once before any fan-out and written once after pricing,
//! so the two concurrent phases never touch it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use folio_common::traits::{BalanceProvider, PriceProvider, TokenMetadataResolver};
use folio_common::types::{NativeQuote, Portfolio, PriceEntry, TokenHolding, TokenMetadata};
use folio_common::{Address, TokenId};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{now_secs, PriceCache};
use crate::pricing::apply_native_mirror;

/// Metadata throttling and wrapped-native handling.
#[derive(Debug, Clone, Default)]
pub struct AggregatorPolicy {
    /// 0 resolves every token at once; otherwise sequential groups of this size.
    pub metadata_batch_size: usize,
    /// Pause between metadata groups.
    pub metadata_batch_delay: Duration,
    /// Token that inherits the native price when it has none of its own.
    pub wrapped_native: Option<TokenId>,
}

/// Stage of a single aggregation run, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    CacheLoaded,
    NativeFetched,
    TokensDiscovered,
    PricesReconciled,
    MetadataResolved,
    MergedAndSorted,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Init => "init",
            RunStage::CacheLoaded => "pricing-cache-loaded",
            RunStage::NativeFetched => "native-fetched",
            RunStage::TokensDiscovered => "tokens-discovered",
            RunStage::PricesReconciled => "prices-reconciled",
            RunStage::MetadataResolved => "metadata-resolved",
            RunStage::MergedAndSorted => "merged-and-sorted",
            RunStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Orchestrates balance discovery, pricing and metadata into a [`Portfolio`].
pub struct PortfolioAggregator {
    balances: Arc<dyn BalanceProvider>,
    metadata: Arc<dyn TokenMetadataResolver>,
    prices: Arc<dyn PriceProvider>,
    cache: PriceCache,
    policy: AggregatorPolicy,
}

impl PortfolioAggregator {
    pub fn new(
        balances: Arc<dyn BalanceProvider>,
        metadata: Arc<dyn TokenMetadataResolver>,
        prices: Arc<dyn PriceProvider>,
        cache: PriceCache,
        policy: AggregatorPolicy,
    ) -> Self {
        Self {
            balances,
            metadata,
            prices,
            cache,
            policy,
        }
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Build the portfolio for `wallet`.
    pub async fn aggregate(&self, wallet: &str) -> Portfolio {
        let mut stage = RunStage::Init;
        let mut advance = |next: RunStage| {
            debug!(from = %stage, to = %next, "aggregation stage");
            stage = next;
        };

        let wallet = match Address::parse(wallet) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("{e}, returning empty portfolio");
                return Portfolio::empty(wallet, Utc::now());
            }
        };
        info!(wallet = %wallet, "aggregating portfolio");

        let mut prices = self.cache.load();
        advance(RunStage::CacheLoaded);

        let (native_balance, native) = tokio::join!(
            self.balances.native_balance(&wallet),
            self.prices.native_price()
        );
        debug!(balance = native_balance, price = native.price, "native position");
        advance(RunStage::NativeFetched);

        let tokens = dedup(self.balances.held_tokens(&wallet).await);
        info!(wallet = %wallet, tokens = tokens.len(), provider = self.balances.name(), "discovered tokens");
        advance(RunStage::TokensDiscovered);

        let now = now_secs();
        let ttl = self.cache.ttl_secs();
        let missing: Vec<TokenId> = tokens
            .iter()
            .filter(|t| !prices.get(*t).is_some_and(|e| e.is_fresh(now, ttl)))
            .cloned()
            .collect();
        info!(
            cached = tokens.len() - missing.len(),
            missing = missing.len(),
            "partitioned tokens against price cache"
        );

        let fetched = !missing.is_empty();
        if fetched {
            prices.extend(self.prices.fetch_prices(&missing).await);
        }
        // Cached or fetched, an unpriced wrapped-native entry takes the native quote.
        let mirrored = match &self.policy.wrapped_native {
            Some(wrapped) if tokens.contains(wrapped) => apply_native_mirror(&mut prices, wrapped, &native, now),
            _ => false,
        };
        if fetched || mirrored {
            self.cache.save(&prices);
        }
        advance(RunStage::PricesReconciled);

        let resolved = self.resolve_metadata(&wallet, &tokens).await;
        advance(RunStage::MetadataResolved);

        let mut holdings: Vec<TokenHolding> = resolved
            .into_iter()
            .filter(|meta| {
                let balance = meta.human_balance();
                if balance.is_finite() && balance > 0.0 {
                    true
                } else {
                    debug!(token = %meta.token, "skipping zero balance");
                    false
                }
            })
            .map(|meta| {
                let price = prices
                    .get(&meta.token)
                    .cloned()
                    .unwrap_or_else(|| PriceEntry::unpriced(now));
                TokenHolding::from_metadata(meta, price)
            })
            .collect();
        // Stable: equal values keep discovery order.
        holdings.sort_by(|a, b| b.value_usd.total_cmp(&a.value_usd));
        advance(RunStage::MergedAndSorted);

        let portfolio = assemble(wallet.as_str(), native_balance, native, holdings);
        info!(
            wallet = %wallet,
            holdings = portfolio.holdings.len(),
            total = portfolio.total_value,
            "portfolio ready"
        );
        advance(RunStage::Done);
        portfolio
    }

    /// Resolve every token, in discovery order.
    async fn resolve_metadata(&self, wallet: &Address, tokens: &[TokenId]) -> Vec<TokenMetadata> {
        let batch = self.policy.metadata_batch_size;
        if batch == 0 || tokens.len() <= batch {
            return join_all(tokens.iter().map(|t| self.metadata.resolve(wallet, t))).await;
        }

        let mut out = Vec::with_capacity(tokens.len());
        for (i, group) in tokens.chunks(batch).enumerate() {
            if i > 0 && !self.policy.metadata_batch_delay.is_zero() {
                tokio::time::sleep(self.policy.metadata_batch_delay).await;
            }
            debug!(group = i + 1, size = group.len(), "resolving metadata group");
            out.extend(join_all(group.iter().map(|t| self.metadata.resolve(wallet, t))).await);
        }
        out
    }
}

fn dedup(tokens: Vec<TokenId>) -> Vec<TokenId> {
    let mut seen = HashSet::new();
    tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

fn assemble(wallet: &str, native_balance: f64, native: NativeQuote, holdings: Vec<TokenHolding>) -> Portfolio {
    let native_value = native_balance * native.price;
    let total_value = native_value + holdings.iter().map(|h| h.value_usd).sum::<f64>();
    Portfolio {
        wallet: wallet.to_string(),
        native_balance,
        native_price: native.price,
        native_change_24h: native.change_24h,
        native_value,
        holdings,
        total_value,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_common::types::{Field, PriceBatch, PriceSource};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WALLET: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    fn token(n: usize) -> TokenId {
        TokenId::parse(&format!("0x{n:040x}")).unwrap()
    }

    struct FakeBalances {
        native: f64,
        tokens: Vec<TokenId>,
        discovery_calls: AtomicUsize,
    }

    impl FakeBalances {
        fn new(native: f64, tokens: Vec<TokenId>) -> Self {
            Self {
                native,
                tokens,
                discovery_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BalanceProvider for FakeBalances {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn native_balance(&self, _wallet: &Address) -> f64 {
            self.native
        }

        async fn held_tokens(&self, _wallet: &Address) -> Vec<TokenId> {
            self.discovery_calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.clone()
        }
    }

    /// Token → (raw balance, decimals, symbol). Unknown tokens fully degrade.
    #[derive(Default)]
    struct FakeMetadata {
        known: HashMap<TokenId, (u128, u8, &'static str)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenMetadataResolver for FakeMetadata {
        async fn resolve(&self, _wallet: &Address, token: &TokenId) -> TokenMetadata {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.known.get(token) {
                Some((raw, decimals, symbol)) => TokenMetadata {
                    token: token.clone(),
                    symbol: Field::Found(symbol.to_string()),
                    name: Field::Found(format!("{symbol} Token")),
                    decimals: Field::Found(*decimals),
                    raw_balance: Field::Found(*raw),
                },
                None => TokenMetadata {
                    token: token.clone(),
                    symbol: Field::Fallback("Unknown".into()),
                    name: Field::Fallback("Unknown Token".into()),
                    decimals: Field::Fallback(18),
                    raw_balance: Field::Fallback(0),
                },
            }
        }
    }

    #[derive(Default)]
    struct FakePrices {
        native: NativeQuote,
        prices: HashMap<TokenId, f64>,
        requested: Mutex<Vec<Vec<TokenId>>>,
    }

    #[async_trait]
    impl PriceProvider for FakePrices {
        fn source(&self) -> PriceSource {
            PriceSource::CoinGecko
        }

        async fn native_price(&self) -> NativeQuote {
            self.native
        }

        async fn fetch_prices(&self, tokens: &[TokenId]) -> PriceBatch {
            self.requested.lock().unwrap().push(tokens.to_vec());
            let now = now_secs();
            tokens
                .iter()
                .map(|t| {
                    let entry = match self.prices.get(t) {
                        Some(p) => PriceEntry::new(*p, Some(0.5), PriceSource::CoinGecko, now),
                        None => PriceEntry::unpriced(now),
                    };
                    (t.clone(), entry)
                })
                .collect()
        }
    }

    struct Harness {
        balances: Arc<FakeBalances>,
        metadata: Arc<FakeMetadata>,
        prices: Arc<FakePrices>,
        _dir: tempfile::TempDir,
        aggregator: PortfolioAggregator,
    }

    fn harness(balances: FakeBalances, metadata: FakeMetadata, prices: FakePrices, policy: AggregatorPolicy) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path().join("price_cache.json"), 1800);
        let balances = Arc::new(balances);
        let metadata = Arc::new(metadata);
        let prices = Arc::new(prices);
        let aggregator = PortfolioAggregator::new(
            balances.clone(),
            metadata.clone(),
            prices.clone(),
            cache,
            policy,
        );
        Harness {
            balances,
            metadata,
            prices,
            _dir: dir,
            aggregator,
        }
    }

    fn assert_invariants(p: &Portfolio) {
        let sum: f64 = p.holdings.iter().map(|h| h.value_usd).sum();
        assert_eq!(p.total_value, p.native_value + sum);
        assert!(p.holdings.windows(2).all(|w| w[0].value_usd >= w[1].value_usd));
        assert!(p.holdings.iter().all(|h| h.balance > 0.0));
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let usdc = token(1);
        let metadata = FakeMetadata {
            known: HashMap::from([(usdc.clone(), (500_000, 6, "USDC"))]),
            ..Default::default()
        };
        let prices = FakePrices {
            native: NativeQuote { price: 2000.0, change_24h: Some(5.0) },
            prices: HashMap::from([(usdc.clone(), 1.0)]),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(2.5, vec![usdc.clone()]), metadata, prices, AggregatorPolicy::default());

        let p = h.aggregator.aggregate(WALLET).await;
        assert_eq!(p.wallet, WALLET.to_ascii_lowercase());
        assert_eq!(p.native_value, 5000.0);
        assert_eq!(p.native_change_24h, Some(5.0));
        assert_eq!(p.holdings.len(), 1);
        assert!((p.holdings[0].balance - 0.5).abs() < 1e-12);
        assert!((p.holdings[0].value_usd - 0.5).abs() < 1e-12);
        assert!((p.total_value - 5000.5).abs() < 1e-9);
        assert_invariants(&p);
    }

    #[tokio::test]
    async fn test_invalid_wallet_short_circuits() {
        let h = harness(
            FakeBalances::new(1.0, vec![token(1)]),
            FakeMetadata::default(),
            FakePrices::default(),
            AggregatorPolicy::default(),
        );
        let p = h.aggregator.aggregate("0x123").await;
        assert_eq!(p.total_value, 0.0);
        assert!(p.holdings.is_empty());
        assert_eq!(p.wallet, "0x123");
        assert_eq!(h.balances.discovery_calls.load(Ordering::SeqCst), 0);
        assert!(h.prices.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_padded_wallet_is_invalid() {
        let prices = FakePrices {
            native: NativeQuote { price: 2000.0, change_24h: None },
            ..Default::default()
        };
        let h = harness(FakeBalances::new(1.0, vec![token(1)]), FakeMetadata::default(), prices, AggregatorPolicy::default());

        let padded = format!("  {WALLET}\n");
        assert!(!folio_common::is_valid_address(&padded));
        let p = h.aggregator.aggregate(&padded).await;
        assert_eq!(p.total_value, 0.0);
        assert_eq!(p.wallet, padded);
        assert_eq!(h.balances.discovery_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_discovery_is_native_only() {
        let prices = FakePrices {
            native: NativeQuote { price: 2000.0, change_24h: None },
            ..Default::default()
        };
        let h = harness(FakeBalances::new(1.5, vec![]), FakeMetadata::default(), prices, AggregatorPolicy::default());

        let p = h.aggregator.aggregate(WALLET).await;
        assert!(p.holdings.is_empty());
        assert_eq!(p.total_value, p.native_value);
        assert_eq!(p.total_value, 3000.0);
        assert!(h.prices.requested.lock().unwrap().is_empty());
        assert!(!h.aggregator.cache().path().exists());
    }

    #[tokio::test]
    async fn test_zero_decimals_excluded() {
        let odd = token(1);
        let metadata = FakeMetadata {
            known: HashMap::from([(odd.clone(), (1_000_000, 0, "ODD"))]),
            ..Default::default()
        };
        let prices = FakePrices {
            prices: HashMap::from([(odd.clone(), 3.0)]),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(0.0, vec![odd]), metadata, prices, AggregatorPolicy::default());

        let p = h.aggregator.aggregate(WALLET).await;
        assert!(p.holdings.is_empty());
        assert_eq!(p.total_value, 0.0);
    }

    #[tokio::test]
    async fn test_sorted_desc_and_unpriced_kept_at_zero() {
        let (a, b, c, d) = (token(1), token(2), token(3), token(4));
        let metadata = FakeMetadata {
            known: HashMap::from([
                (a.clone(), (10, 1, "A")),
                (b.clone(), (50, 1, "B")),
                (c.clone(), (20, 1, "C")),
                (d.clone(), (0, 1, "D")),
            ]),
            ..Default::default()
        };
        let prices = FakePrices {
            prices: HashMap::from([(a.clone(), 1.0), (b.clone(), 2.0)]),
            ..Default::default()
        };
        let h = harness(
            FakeBalances::new(0.0, vec![a.clone(), b.clone(), c.clone(), d.clone()]),
            metadata,
            prices,
            AggregatorPolicy::default(),
        );

        let p = h.aggregator.aggregate(WALLET).await;
        let order: Vec<&TokenId> = p.holdings.iter().map(|h| &h.token).collect();
        assert_eq!(order, vec![&b, &a, &c]);
        assert_eq!(p.holdings[2].price.source, PriceSource::None);
        assert_eq!(p.holdings[2].value_usd, 0.0);
        assert_invariants(&p);
    }

    #[tokio::test]
    async fn test_ties_keep_discovery_order() {
        let tokens: Vec<TokenId> = (1..=4).map(token).collect();
        let metadata = FakeMetadata {
            known: tokens.iter().map(|t| (t.clone(), (100, 2, "T"))).collect(),
            ..Default::default()
        };
        let prices = FakePrices {
            prices: tokens.iter().map(|t| (t.clone(), 1.0)).collect(),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(0.0, tokens.clone()), metadata, prices, AggregatorPolicy::default());

        let p = h.aggregator.aggregate(WALLET).await;
        let order: Vec<TokenId> = p.holdings.iter().map(|h| h.token.clone()).collect();
        assert_eq!(order, tokens);
    }

    #[tokio::test]
    async fn test_warm_cache_skips_repricing() {
        let (a, b) = (token(1), token(2));
        let metadata = FakeMetadata {
            known: HashMap::from([(a.clone(), (100, 2, "A")), (b.clone(), (300, 2, "B"))]),
            ..Default::default()
        };
        let prices = FakePrices {
            native: NativeQuote { price: 10.0, change_24h: None },
            prices: HashMap::from([(a.clone(), 4.0), (b.clone(), 0.25)]),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(1.0, vec![a, b]), metadata, prices, AggregatorPolicy::default());

        let first = h.aggregator.aggregate(WALLET).await;
        let second = h.aggregator.aggregate(WALLET).await;

        assert_eq!(first.total_value, second.total_value);
        assert_eq!(h.prices.requested.lock().unwrap().len(), 1);
        assert_eq!(h.aggregator.cache().load().len(), 2);
    }

    #[tokio::test]
    async fn test_only_missing_tokens_priced() {
        let (cached, fresh) = (token(1), token(2));
        let metadata = FakeMetadata {
            known: HashMap::from([(cached.clone(), (1, 0, "X")), (fresh.clone(), (1, 0, "Y"))]),
            ..Default::default()
        };
        let h = harness(
            FakeBalances::new(0.0, vec![cached.clone(), fresh.clone()]),
            metadata,
            FakePrices::default(),
            AggregatorPolicy::default(),
        );
        let mut seeded = folio_common::types::PriceMap::new();
        seeded.insert(cached.clone(), PriceEntry::new(7.0, None, PriceSource::CoinGecko, now_secs()));
        h.aggregator.cache().save(&seeded);

        h.aggregator.aggregate(WALLET).await;
        let requested = h.prices.requested.lock().unwrap();
        assert_eq!(*requested, vec![vec![fresh]]);
    }

    #[tokio::test]
    async fn test_wrapped_native_mirrors_native_price() {
        let weth = token(9);
        let metadata = FakeMetadata {
            known: HashMap::from([(weth.clone(), (2_000_000_000_000_000_000, 18, "WETH"))]),
            ..Default::default()
        };
        let prices = FakePrices {
            native: NativeQuote { price: 2000.0, change_24h: Some(5.0) },
            ..Default::default()
        };
        let policy = AggregatorPolicy {
            wrapped_native: Some(weth.clone()),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(0.0, vec![weth.clone()]), metadata, prices, policy);

        let p = h.aggregator.aggregate(WALLET).await;
        assert_eq!(p.holdings[0].price.source, PriceSource::Mirror);
        assert_eq!(p.holdings[0].price.change_24h, Some(5.0));
        assert!((p.holdings[0].value_usd - 4000.0).abs() < 1e-9);
        assert_eq!(h.aggregator.cache().load()[&weth].source, PriceSource::Mirror);
    }

    #[tokio::test]
    async fn test_cached_unpriced_wrapped_native_is_mirrored() {
        let weth = token(9);
        let metadata = FakeMetadata {
            known: HashMap::from([(weth.clone(), (1_000_000_000_000_000_000, 18, "WETH"))]),
            ..Default::default()
        };
        let prices = FakePrices {
            native: NativeQuote { price: 2000.0, change_24h: Some(1.0) },
            ..Default::default()
        };
        let policy = AggregatorPolicy {
            wrapped_native: Some(weth.clone()),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(0.0, vec![weth.clone()]), metadata, prices, policy);
        let mut seeded = folio_common::types::PriceMap::new();
        seeded.insert(weth.clone(), PriceEntry::unpriced(now_secs()));
        h.aggregator.cache().save(&seeded);

        let p = h.aggregator.aggregate(WALLET).await;
        assert!(h.prices.requested.lock().unwrap().is_empty());
        assert_eq!(p.holdings[0].price.price, 2000.0);
        assert_eq!(p.holdings[0].price.source, PriceSource::Mirror);
        assert_eq!(h.aggregator.cache().load()[&weth].source, PriceSource::Mirror);
    }

    #[tokio::test]
    async fn test_cached_price_above_ceiling_never_served() {
        let a = token(1);
        let metadata = FakeMetadata {
            known: HashMap::from([(a.clone(), (100, 2, "A"))]),
            ..Default::default()
        };
        let h = harness(FakeBalances::new(0.0, vec![a.clone()]), metadata, FakePrices::default(), AggregatorPolicy::default());
        let mut seeded = folio_common::types::PriceMap::new();
        seeded.insert(a.clone(), PriceEntry::new(9_876_543.0, None, PriceSource::CoinGecko, now_secs()));
        h.aggregator.cache().save(&seeded);

        let p = h.aggregator.aggregate(WALLET).await;
        assert_eq!(*h.prices.requested.lock().unwrap(), vec![vec![a.clone()]]);
        assert_eq!(p.holdings.len(), 1);
        assert_eq!(p.holdings[0].price.price, 0.0);
        assert_eq!(p.total_value, 0.0);
        let raw = std::fs::read_to_string(h.aggregator.cache().path()).unwrap();
        assert!(!raw.contains("9876543"));
        assert_eq!(h.aggregator.cache().load()[&a].price, 0.0);
    }

    #[tokio::test]
    async fn test_metadata_batches_preserve_order() {
        let tokens: Vec<TokenId> = (1..=5).map(token).collect();
        let metadata = FakeMetadata {
            known: tokens.iter().map(|t| (t.clone(), (100, 2, "T"))).collect(),
            ..Default::default()
        };
        let policy = AggregatorPolicy {
            metadata_batch_size: 2,
            metadata_batch_delay: Duration::from_millis(1),
            wrapped_native: None,
        };
        let h = harness(FakeBalances::new(0.0, tokens.clone()), metadata, FakePrices::default(), policy);

        let p = h.aggregator.aggregate(WALLET).await;
        assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 5);
        let order: Vec<TokenId> = p.holdings.iter().map(|h| h.token.clone()).collect();
        assert_eq!(order, tokens);
    }

    #[tokio::test]
    async fn test_duplicate_discovery_resolved_once() {
        let a = token(1);
        let metadata = FakeMetadata {
            known: HashMap::from([(a.clone(), (100, 2, "A"))]),
            ..Default::default()
        };
        let h = harness(
            FakeBalances::new(0.0, vec![a.clone(), a.clone()]),
            metadata,
            FakePrices::default(),
            AggregatorPolicy::default(),
        );

        let p = h.aggregator.aggregate(WALLET).await;
        assert_eq!(p.holdings.len(), 1);
        assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RunStage::CacheLoaded.to_string(), "pricing-cache-loaded");
        assert_eq!(RunStage::Done.to_string(), "done");
    }
}
