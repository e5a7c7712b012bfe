//! Time-bounded metadata cache with a maximum-size eviction policy
//!
//! Avoids repeating expensive upstream lookups. Entries carry a per-entry
//! expiry; reads past the expiry behave as a miss (lazy expiry) and a
//! periodic background sweep reclaims entries that are written once and
//! never read again.
//!
//! Eviction is deliberately simpler than LRU: when the store is at capacity,
//! the entries closest to expiry are dropped first (the lowest 30%, rounded
//! up, at least one). A single sort per eviction keeps the hot path cheap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Fraction of entries removed per eviction pass, expressed as numerator
/// over [`EVICT_DENOMINATOR`]
const EVICT_NUMERATOR: usize = 3;
const EVICT_DENOMINATOR: usize = 10;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Key-value store with per-entry expiry and bounded size
///
/// All operations serialize on an internal mutex, so a shared
/// `Arc<TtlCache<V>>` is safe to use from concurrent tasks. None of the
/// operations fail; absence is an `Option::None`, never an error.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    max_entries: usize,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache bounded to `max_entries`, inserting with `default_ttl`
    /// when no explicit TTL is given
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    /// Insert a value with the default TTL
    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Insert a value with an explicit TTL
    ///
    /// If the store is at or above its maximum size, eviction runs before the
    /// insertion: entries are ranked by expiry (soonest first) and the lowest
    /// 30% (rounded up, at least one) are removed. Replacing an existing key
    /// cannot grow the store, so it never triggers eviction.
    pub async fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.lock().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            Self::evict(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Look up a value
    ///
    /// An expired entry is removed as a side effect and reported as absent,
    /// whether or not the periodic sweep has run yet.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Whether a live (non-expired) entry exists for `key`
    pub async fn has(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    /// Remove an entry; returns whether it was present
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// Remove all entries
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Purge every expired entry; returns how many were removed
    pub async fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held (including not-yet-swept expired ones)
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn evict(entries: &mut HashMap<String, CacheEntry<V>>) {
        let evict_count = entries
            .len()
            .saturating_mul(EVICT_NUMERATOR)
            .div_ceil(EVICT_DENOMINATOR)
            .max(1);

        let mut by_expiry: Vec<(String, Instant)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);

        for (key, _) in by_expiry.into_iter().take(evict_count) {
            entries.remove(&key);
        }
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Spawn the periodic expiry sweep as a background task
    ///
    /// Runs [`cleanup`](Self::cleanup) every `interval` until the token is
    /// cancelled. Tests that need deterministic behavior call `cleanup()`
    /// directly instead of relying on the timer.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of tokio's interval fires immediately; skip it so
            // the first sweep happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.cleanup().await;
                        if removed > 0 {
                            tracing::debug!(removed, "cache sweep removed expired entries");
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        break;
                    }
                }
            }
        })
    }
}
