//! Price cache — a JSON file of token → price entries with a fixed TTL.
//!
//! Read once at the start of an aggregation run, written once after the
//! pricing phase. Nothing here ever fails the caller: a missing or corrupt
//! file is an empty cache, and a failed write only costs the next run a
//! refetch.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use folio_common::constants::{MAX_TOKEN_PRICE_USD, PRICE_CACHE_TTL_SECS};
use folio_common::types::{PriceEntry, PriceMap};
use folio_common::{FolioError, FolioResult, TokenId};
use tracing::{debug, error, info, warn};

/// Dotfolder name under `$HOME`.
const DOTFOLDER: &str = ".folio";

/// Cache file location relative to the dotfolder.
const CACHE_FILE: &str = "data/price_cache.json";

/// File-backed, time-expiring price store.
#[derive(Debug, Clone)]
pub struct PriceCache {
    path: PathBuf,
    ttl_secs: u64,
    max_price: f64,
}

/// Current time as fractional unix seconds.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Remove every entry older than `ttl_secs`. Returns how many were removed.
pub fn purge_expired(map: &mut PriceMap, now: f64, ttl_secs: u64) -> usize {
    let before = map.len();
    map.retain(|_, entry| entry.is_fresh(now, ttl_secs));
    before - map.len()
}

/// Remove every entry priced above `max_price`. Returns how many were removed.
pub fn purge_over_ceiling(map: &mut PriceMap, max_price: f64) -> usize {
    let before = map.len();
    map.retain(|token, entry| {
        let keep = entry.price <= max_price;
        if !keep {
            warn!(token = %token, price = entry.price, "dropping cached price above ceiling");
        }
        keep
    });
    before - map.len()
}

impl PriceCache {
    pub fn new(path: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            path: path.into(),
            ttl_secs,
            max_price: MAX_TOKEN_PRICE_USD,
        }
    }

    /// Replace the default price ceiling applied on load.
    pub fn with_max_price(mut self, max_price: f64) -> Self {
        self.max_price = max_price;
        self
    }

    /// `$HOME/.folio/data/price_cache.json` with the standard TTL.
    pub fn at_default_location() -> FolioResult<Self> {
        Ok(Self::new(Self::default_path()?, PRICE_CACHE_TTL_SECS))
    }

    pub fn default_path() -> FolioResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| FolioError::Config("Could not determine home directory".into()))?;
        Ok(home.join(DOTFOLDER).join(CACHE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn max_price(&self) -> f64 {
        self.max_price
    }

    /// Load the cache, dropping expired, malformed and over-ceiling entries.
    pub fn load(&self) -> PriceMap {
        self.load_at(now_secs())
    }

    /// [`load`](Self::load) against an explicit clock.
    ///
    /// If anything was dropped, the cleaned map is written back before
    /// returning it.
    pub fn load_at(&self, now: f64) -> PriceMap {
        let (mut map, malformed) = match self.read_entries() {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                info!(path = %self.path.display(), "price cache not found, starting empty");
                return PriceMap::new();
            }
            Err(e) => {
                error!(path = %self.path.display(), "failed to read price cache: {e}. Starting empty");
                return PriceMap::new();
            }
        };

        let expired = purge_expired(&mut map, now, self.ttl_secs);
        let over_ceiling = purge_over_ceiling(&mut map, self.max_price);
        info!(entries = map.len(), "loaded price cache");

        if expired > 0 || malformed > 0 || over_ceiling > 0 {
            info!(expired, malformed, over_ceiling, "cleaned price cache");
            self.save(&map);
        }
        map
    }

    /// Replace the persisted cache with `map`. Failures are logged only.
    pub fn save(&self, map: &PriceMap) {
        match self.try_save(map) {
            Ok(()) => debug!(entries = map.len(), path = %self.path.display(), "saved price cache"),
            Err(e) => error!(path = %self.path.display(), "failed to save price cache: {e}"),
        }
    }

    /// Persist an empty cache.
    pub fn clear(&self) -> FolioResult<()> {
        self.try_save(&PriceMap::new())
    }

    /// Returns `Ok(None)` when the file does not exist, plus the number of
    /// entries that had to be skipped.
    fn read_entries(&self) -> FolioResult<Option<(PriceMap, usize)>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let values: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)?;

        let mut map = PriceMap::new();
        let mut malformed = 0usize;
        for (key, value) in values {
            let token = TokenId::parse(&key);
            let entry = serde_json::from_value::<PriceEntry>(value);
            match (token, entry) {
                (Ok(token), Ok(entry)) => {
                    map.insert(token, entry);
                }
                _ => {
                    warn!(key = %key, "skipping malformed price cache entry");
                    malformed += 1;
                }
            }
        }
        Ok(Some((map, malformed)))
    }

    fn try_save(&self, map: &PriceMap) -> FolioResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(map)?;

        // Write-then-rename so a crash mid-write never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| FolioError::Cache(format!("rename {}: {e}", tmp.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_common::types::PriceSource;

    const TTL: u64 = 1800;
    const NOW: f64 = 1_700_000_000.0;

    fn token(hex_char: char) -> TokenId {
        TokenId::parse(&format!("0x{}", hex_char.to_string().repeat(40))).unwrap()
    }

    fn entry(price: f64, observed_at: f64) -> PriceEntry {
        PriceEntry::new(price, Some(1.25), PriceSource::CoinGecko, observed_at)
    }

    fn cache_in(dir: &tempfile::TempDir) -> PriceCache {
        PriceCache::new(dir.path().join("data/price_cache.json"), TTL)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.load_at(NOW).is_empty());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_save_load_roundtrip_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        let mut map = PriceMap::new();
        map.insert(token('a'), entry(1.0, NOW - 10.0));
        map.insert(token('b'), entry(2500.5, NOW - TTL as f64));
        cache.save(&map);

        assert_eq!(cache.load_at(NOW), map);
    }

    #[test]
    fn test_expired_entries_purged_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        let mut map = PriceMap::new();
        map.insert(token('a'), entry(1.0, NOW - 10.0));
        map.insert(token('b'), entry(2.0, NOW - TTL as f64 - 1.0));
        cache.save(&map);

        let loaded = cache.load_at(NOW);
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&token('a')));

        // The cleaned map was written back.
        let raw = fs::read_to_string(cache.path()).unwrap();
        assert!(!raw.contains(token('b').as_str()));
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        fs::write(cache.path(), "{ not json").unwrap();

        assert!(cache.load_at(NOW).is_empty());
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        let good = token('c');
        let body = serde_json::json!({
            good.as_str(): { "price": 3.0, "change_24h": null, "source": "coingecko", "timestamp": NOW },
            "not-an-address": { "price": 1.0, "source": "coingecko", "timestamp": NOW },
            token('d').as_str(): { "price": "oops" },
        });
        fs::write(cache.path(), body.to_string()).unwrap();

        let loaded = cache.load_at(NOW);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&good].price, 3.0);
    }

    #[test]
    fn test_mixed_case_keys_normalized_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        let body = serde_json::json!({
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48": {
                "price": 1.0, "source": "coingecko", "timestamp": NOW
            }
        });
        fs::write(cache.path(), body.to_string()).unwrap();

        let loaded = cache.load_at(NOW);
        let usdc = TokenId::parse("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
        assert!(loaded.contains_key(&usdc));
    }

    #[test]
    fn test_save_failure_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so create_dir_all fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let cache = PriceCache::new(blocker.join("cache.json"), TTL);

        let mut map = PriceMap::new();
        map.insert(token('a'), entry(1.0, NOW));
        cache.save(&map);
        assert!(cache.load_at(NOW).is_empty());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mut map = PriceMap::new();
        map.insert(token('a'), entry(1.0, NOW));
        cache.save(&map);

        cache.clear().unwrap();
        assert!(cache.load_at(NOW).is_empty());
    }

    #[test]
    fn test_over_ceiling_entries_purged_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir).with_max_price(100.0);

        let mut map = PriceMap::new();
        map.insert(token('a'), entry(100.0, NOW));
        map.insert(token('b'), entry(9_000_000.0, NOW));
        cache.save(&map);

        let loaded = cache.load_at(NOW);
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&token('a')));
        let raw = fs::read_to_string(cache.path()).unwrap();
        assert!(!raw.contains(token('b').as_str()));
    }

    #[test]
    fn test_default_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cache_in(&dir).max_price(), MAX_TOKEN_PRICE_USD);
    }

    #[test]
    fn test_purge_expired_counts() {
        let mut map = PriceMap::new();
        map.insert(token('a'), entry(1.0, NOW));
        map.insert(token('b'), entry(1.0, NOW - 5000.0));
        map.insert(token('c'), entry(1.0, NOW - 1801.0));
        assert_eq!(purge_expired(&mut map, NOW, TTL), 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_default_path_under_home() {
        let path = PriceCache::default_path().unwrap();
        assert!(path.ends_with(".folio/data/price_cache.json"));
    }
}
