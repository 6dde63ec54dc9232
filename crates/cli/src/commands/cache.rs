use anyhow::{Context, Result};
use folio_core::cache::now_secs;
use folio_core::config::{env_lookup, load_dotenv, price_cache_from_lookup};
use folio_core::PriceCache;
use folio_utils::output::{render, CacheClearOutput, CacheOutput, CacheRow, OutputFormat};

fn open() -> Result<PriceCache> {
    load_dotenv();
    price_cache_from_lookup(env_lookup).context("locating price cache")
}

/// `folio cache show` — fresh entries with their age. Expired entries are
/// purged by the load itself.
pub fn show(fmt: OutputFormat) -> Result<()> {
    let cache = open()?;
    let now = now_secs();
    let entries = cache
        .load_at(now)
        .into_iter()
        .map(|(token, entry)| CacheRow {
            token: token.to_string(),
            price: entry.price,
            change_24h: entry.change_24h,
            source: entry.source.to_string(),
            observed_at: entry.observed_at,
            age_secs: entry.age_secs(now),
        })
        .collect();

    let output = CacheOutput {
        path: cache.path().display().to_string(),
        ttl_secs: cache.ttl_secs(),
        entries,
    };
    render(fmt, &output)
}

/// `folio cache clear` — replace the cache with an empty one.
pub fn clear(fmt: OutputFormat) -> Result<()> {
    let cache = open()?;
    let cleared = cache.load().len();
    cache.clear().context("clearing price cache")?;
    let output = CacheClearOutput {
        path: cache.path().display().to_string(),
        cleared,
    };
    render(fmt, &output)
}
