use super::nominatim::NominatimClient;
use super::types::GeoPlace;
use crate::cache::{expiry_after, init_cache, CacheEntry, ResponseCache};
use crate::clock::SharedClock;
use crate::config::UpstreamSettings;
use crate::error::{ServiceError, Upstream};
use crate::rate_limit::SlidingWindowRateLimiter;
use crate::utils::{normalize_query, CoordKey};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Forward/reverse lookups through [`NominatimClient`] with one TTL cache per
/// direction. Both directions draw from the same quota.
pub struct GeocoderGateway {
    client: NominatimClient,
    forward_cache: ResponseCache<(String, usize), Arc<Vec<GeoPlace>>>,
    reverse_cache: ResponseCache<CoordKey, Option<GeoPlace>>,
    limiter: Option<SlidingWindowRateLimiter>,
    ttl: Duration,
    clock: SharedClock,
}

impl GeocoderGateway {
    pub fn new(settings: &UpstreamSettings, max_entries: u64, clock: SharedClock) -> reqwest::Result<Self> {
        let limiter = SlidingWindowRateLimiter::new(
            settings.rate_limit_max_calls,
            settings.rate_limit_period,
            clock.clone(),
        );
        if limiter.is_none() {
            tracing::warn!("Geocoder rate limiting disabled (max_calls or period is zero)");
        }

        Ok(Self {
            client: NominatimClient::new(settings)?,
            forward_cache: init_cache(max_entries),
            reverse_cache: init_cache(max_entries),
            limiter,
            ttl: settings.cache_ttl,
            clock,
        })
    }

    pub async fn forward(&self, query: &str, limit: usize) -> Result<Arc<Vec<GeoPlace>>, ServiceError> {
        self.client.user_agent()?;

        let key = (normalize_query(query), limit);
        self.read_through(&self.forward_cache, key, "forward", || async {
            self.client.forward(query, limit).await.map(Arc::new)
        })
        .await
    }

    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<GeoPlace>, ServiceError> {
        self.client.user_agent()?;

        let key = CoordKey::new(lat, lon);
        self.read_through(&self.reverse_cache, key, "reverse", || {
            self.client.reverse(key.lat(), key.lon())
        })
        .await
    }

    /// Drop both caches and the limiter history.
    pub fn clear(&self) {
        self.forward_cache.invalidate_all();
        self.reverse_cache.invalidate_all();
        if let Some(limiter) = &self.limiter {
            limiter.reset();
        }
    }

    async fn read_through<K, V, F, Fut>(
        &self,
        cache: &ResponseCache<K, V>,
        key: K,
        direction: &str,
        fetch: F,
    ) -> Result<V, ServiceError>
    where
        K: Hash + Eq + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ServiceError>>,
    {
        let now = self.clock.now();
        if let Some(entry) = cache.get(&key).await {
            if entry.is_fresh(now) {
                tracing::info!(
                    "Geocoder {} cache hit key={:?} ttl_left_s={:.2}",
                    direction,
                    key,
                    (entry.expires_at - now).as_secs_f64()
                );
                return Ok(entry.value);
            }
        }

        self.check_rate_limit()?;

        let value = fetch().await?;
        let entry = CacheEntry {
            value: value.clone(),
            freshness_token: None,
            expires_at: expiry_after(self.clock.now(), self.ttl),
        };

        tracing::info!(
            "Geocoder {} cache stored key={:?} ttl_s={:.2}",
            direction,
            key,
            self.ttl.as_secs_f64()
        );
        cache.insert(key, entry).await;
        Ok(value)
    }

    fn check_rate_limit(&self) -> Result<(), ServiceError> {
        match &self.limiter {
            Some(limiter) if !limiter.allow() => {
                tracing::warn!(
                    "Geocoder rate limit exceeded max_calls={} period_s={:.2}",
                    limiter.max_calls(),
                    limiter.period().as_secs_f64()
                );
                Err(ServiceError::RateLimitExceeded(Upstream::Geocoder))
            }
            _ => Ok(()),
        }
    }
}
