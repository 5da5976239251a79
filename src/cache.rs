use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::hash::Hash;
use std::time::{Duration, Instant};

// Roughly a century; stands in for TTLs too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// In-memory response cache owned by a gateway.
///
/// moka's own TTL is not configured: an expired entry must stay
/// readable so its freshness token can be used for revalidation. Expiry is
/// tracked per entry instead, and the capacity bound is the only eviction.
/// A full cache must still admit new keys, hence LRU.
pub type ResponseCache<K, V> = Cache<K, CacheEntry<V>>;

pub fn init_cache<K, V>(max_entries: u64) -> ResponseCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_entries)
        .eviction_policy(EvictionPolicy::lru())
        .build()
}

/// `now + ttl`, saturating at a far-future instant instead of overflowing.
pub fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Upstream `Last-Modified`, echoed back as `If-Modified-Since`.
    pub freshness_token: Option<String>,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}
