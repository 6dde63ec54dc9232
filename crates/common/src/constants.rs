//! Universal constants for Folio.

/// Prefix every EVM address carries.
pub const ADDRESS_PREFIX: &str = "0x";

/// Number of hex characters after the prefix (20 bytes).
pub const ADDRESS_HEX_LEN: usize = 40;

/// Native coin exponent: 1 ETH = 10^18 wei.
pub const NATIVE_DECIMALS: u32 = 18;

/// Native coin display symbol.
pub const NATIVE_SYMBOL: &str = "ETH";

/// Decimals assumed when a token contract does not answer `decimals()`.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Symbol used when a token contract does not answer `symbol()`.
pub const UNKNOWN_SYMBOL: &str = "Unknown";

/// Name used when neither `name()` nor `symbol()` could be read.
pub const UNKNOWN_NAME: &str = "Unknown Token";

// ── Price cache ───────────────────────────────────────────────────────

/// Cached price entries older than this are purged on load and never served.
pub const PRICE_CACHE_TTL_SECS: u64 = 30 * 60;

/// Prices above this ceiling (USD) are treated as bad upstream data.
pub const MAX_TOKEN_PRICE_USD: f64 = 200_000.0;

// ── Pricing batches ───────────────────────────────────────────────────

/// Contract addresses per price request.
pub const PRICE_CHUNK_SIZE: usize = 20;

/// Attempts per chunk before its tokens are zero-filled.
pub const PRICE_MAX_ATTEMPTS: u32 = 3;

/// Backoff base between attempts: wait = base * 2^attempt.
pub const PRICE_BACKOFF_BASE_MS: u64 = 1000;

/// Self-throttle between consecutive chunks.
pub const PRICE_CHUNK_DELAY_MS: u64 = 500;

// ── Discovery ─────────────────────────────────────────────────────────

/// Most recent token transfers consulted by the history-scan discovery.
pub const TRANSFER_HISTORY_WINDOW: usize = 100;

/// Default per-request HTTP timeout.
pub const HTTP_TIMEOUT_SECS: u64 = 20;

/// Wrapped ether on Ethereum mainnet. Trades 1:1 with the native coin.
pub const WRAPPED_NATIVE_ADDRESS: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

/// High-liquidity tokens always checked by the history-scan discovery,
/// so holdings whose last transfer fell outside the window are not missed.
pub const WELL_KNOWN_TOKENS: &[(&str, &str)] = &[
    ("WETH", WRAPPED_NATIVE_ADDRESS),
    ("USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
    ("USDT", "0xdac17f958d2ee523a2206206994597c13d831ec7"),
    ("DAI", "0x6b175474e89094c44da98b954eedeac495271d0f"),
    ("WBTC", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599"),
    ("LINK", "0x514910771af9ca656af840dff83e8264ecf986ca"),
    ("UNI", "0x1f9840a85d5af5bf1d1762f925bdaddc4201f984"),
];

/// Provider identifiers reported by `check_providers_configured`.
pub const PROVIDER_RPC: &str = "rpc";
pub const PROVIDER_COINGECKO: &str = "coingecko";
pub const PROVIDER_ETHERSCAN: &str = "etherscan";
pub const PROVIDER_DEFILLAMA: &str = "defillama";
