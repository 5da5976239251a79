use super::met::MetClient;
use crate::cache::{expiry_after, init_cache, CacheEntry, ResponseCache};
use crate::clock::SharedClock;
use crate::config::UpstreamSettings;
use crate::error::{ServiceError, Upstream};
use crate::rate_limit::SlidingWindowRateLimiter;
use crate::utils::CoordKey;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of [`MetClient`].
///
/// Per coordinate key an entry moves Empty -> Fresh -> Stale -> Fresh. A
/// stale entry is revalidated with `If-Modified-Since`; a `304` keeps the
/// cached body and only extends its expiry. Every upstream call, revalidation
/// included, has to pass the rate limiter first.
pub struct MetGateway {
    client: MetClient,
    cache: ResponseCache<CoordKey, Arc<Value>>,
    limiter: Option<SlidingWindowRateLimiter>,
    ttl: Duration,
    clock: SharedClock,
}

impl MetGateway {
    pub fn new(settings: &UpstreamSettings, max_entries: u64, clock: SharedClock) -> reqwest::Result<Self> {
        let limiter = SlidingWindowRateLimiter::new(
            settings.rate_limit_max_calls,
            settings.rate_limit_period,
            clock.clone(),
        );
        if limiter.is_none() {
            tracing::warn!("MET rate limiting disabled (max_calls or period is zero)");
        }

        Ok(Self {
            client: MetClient::new(settings)?,
            cache: init_cache(max_entries),
            limiter,
            ttl: settings.cache_ttl,
            clock,
        })
    }

    /// Compact forecast payload for the truncated coordinates.
    pub async fn get(&self, lat: f64, lon: f64) -> Result<Arc<Value>, ServiceError> {
        self.client.user_agent()?;

        let key = CoordKey::new(lat, lon);
        let now = self.clock.now();
        let prior = self.cache.get(&key).await;

        if let Some(entry) = &prior {
            if entry.is_fresh(now) {
                tracing::info!(
                    "MET cache hit key={:?} ttl_left_s={:.2}",
                    key,
                    (entry.expires_at - now).as_secs_f64()
                );
                return Ok(entry.value.clone());
            }
        }

        self.check_rate_limit()?;

        let token = prior.as_ref().and_then(|entry| entry.freshness_token.as_deref());
        let response = self.client.fetch_compact(key.lat(), key.lon(), token).await?;
        let expires_at = expiry_after(self.clock.now(), self.ttl);

        let entry = match (response.data, prior) {
            (Some(data), _) => {
                tracing::info!(
                    "MET cache stored key={:?} ttl_s={:.2} last_modified={:?}",
                    key,
                    self.ttl.as_secs_f64(),
                    response.last_modified
                );
                CacheEntry {
                    value: Arc::new(data),
                    freshness_token: response.last_modified,
                    expires_at,
                }
            }
            (None, Some(prior)) => {
                tracing::info!(
                    "MET cache revalidated (304) key={:?} new_ttl_s={:.2}",
                    key,
                    self.ttl.as_secs_f64()
                );
                CacheEntry {
                    value: prior.value,
                    freshness_token: response.last_modified.or(prior.freshness_token),
                    expires_at,
                }
            }
            (None, None) => {
                return Err(ServiceError::malformed(
                    Upstream::Met,
                    "304 Not Modified but no cached response is available",
                ));
            }
        };

        let payload = entry.value.clone();
        self.cache.insert(key, entry).await;
        Ok(payload)
    }

    /// Drop every cached forecast and the limiter history.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        if let Some(limiter) = &self.limiter {
            limiter.reset();
        }
    }

    fn check_rate_limit(&self) -> Result<(), ServiceError> {
        match &self.limiter {
            Some(limiter) if !limiter.allow() => {
                tracing::warn!(
                    "MET rate limit exceeded max_calls={} period_s={:.2}",
                    limiter.max_calls(),
                    limiter.period().as_secs_f64()
                );
                Err(ServiceError::RateLimitExceeded(Upstream::Met))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::forecast::met::tests::{met_payload, met_settings, LAST_MOD};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn build_gateway(settings: &UpstreamSettings, clock: Arc<ManualClock>) -> MetGateway {
        MetGateway::new(settings, 100, clock).unwrap()
    }

    async fn if_modified_since_headers(server: &MockServer) -> Vec<Option<String>> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| {
                request
                    .headers
                    .get("if-modified-since")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_cache_hit_makes_single_upstream_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(met_payload())
                    .insert_header("Last-Modified", LAST_MOD),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(300);
        let gateway = build_gateway(&settings, Arc::new(ManualClock::new()));

        let first = gateway.get(44.8125, 20.4612).await.unwrap();
        // Same key after truncation.
        let second = gateway.get(44.81259, 20.46129).await.unwrap();

        assert_eq!(*first, met_payload());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_huge_ttl_caches_without_overflow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(met_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::MAX;
        let clock = Arc::new(ManualClock::new());
        let gateway = build_gateway(&settings, clock.clone());

        gateway.get(1.0, 2.0).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));
        gateway.get(1.0, 2.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_revalidates_with_if_modified_since_and_handles_304() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(met_payload())
                    .insert_header("Last-Modified", LAST_MOD),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(10);
        let clock = Arc::new(ManualClock::new());
        let gateway = build_gateway(&settings, clock.clone());

        let first = gateway.get(44.8125, 20.4612).await.unwrap();

        clock.advance(Duration::from_secs(11));
        let second = gateway.get(44.8125, 20.4612).await.unwrap();
        assert_eq!(second, first);

        // Revalidation refreshed the expiry: no third upstream call.
        clock.advance(Duration::from_secs(5));
        let third = gateway.get(44.8125, 20.4612).await.unwrap();
        assert_eq!(third, first);

        assert_eq!(
            if_modified_since_headers(&server).await,
            vec![None, Some(LAST_MOD.to_string())]
        );
    }

    #[tokio::test]
    async fn test_304_with_new_last_modified_replaces_token() {
        let newer = "Tue, 27 Jan 2026 08:00:00 GMT";
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(met_payload())
                    .insert_header("Last-Modified", LAST_MOD),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(304).insert_header("Last-Modified", newer))
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(10);
        let clock = Arc::new(ManualClock::new());
        let gateway = build_gateway(&settings, clock.clone());

        gateway.get(1.0, 2.0).await.unwrap();
        clock.advance(Duration::from_secs(10));
        gateway.get(1.0, 2.0).await.unwrap();
        clock.advance(Duration::from_secs(10));
        gateway.get(1.0, 2.0).await.unwrap();

        assert_eq!(
            if_modified_since_headers(&server).await,
            vec![None, Some(LAST_MOD.to_string()), Some(newer.to_string())]
        );
    }

    #[tokio::test]
    async fn test_changed_body_replaces_cached_payload() {
        let updated = json!({"properties": {"timeseries": []}});
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(met_payload()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(updated.clone()))
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(10);
        let clock = Arc::new(ManualClock::new());
        let gateway = build_gateway(&settings, clock.clone());

        assert_eq!(*gateway.get(1.0, 2.0).await.unwrap(), met_payload());
        clock.advance(Duration::from_secs(10));
        assert_eq!(*gateway.get(1.0, 2.0).await.unwrap(), updated);

        // Without a Last-Modified header there is nothing to revalidate with.
        assert_eq!(if_modified_since_headers(&server).await, vec![None, None]);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_second_upstream_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(met_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::ZERO;
        settings.rate_limit_max_calls = 1;
        settings.rate_limit_period = Duration::from_secs(60);
        let gateway = build_gateway(&settings, Arc::new(ManualClock::new()));

        gateway.get(44.8125, 20.4612).await.unwrap();
        let err = gateway.get(44.8125, 20.4612).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(matches!(err, ServiceError::RateLimitExceeded(Upstream::Met)));

        // The denied call left the stale entry (and its payload) in place.
        let entry = gateway.cache.get(&CoordKey::new(44.8125, 20.4612)).await.unwrap();
        assert_eq!(*entry.value, met_payload());
    }

    #[tokio::test]
    async fn test_fresh_hits_do_not_consume_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(met_payload()))
            .expect(2)
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(300);
        settings.rate_limit_max_calls = 2;
        settings.rate_limit_period = Duration::from_secs(60);
        let gateway = build_gateway(&settings, Arc::new(ManualClock::new()));

        for _ in 0..5 {
            gateway.get(10.0, 10.0).await.unwrap();
        }
        gateway.get(11.0, 11.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_304_without_cached_entry_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let gateway = build_gateway(&met_settings(&server.uri()), Arc::new(ManualClock::new()));
        let err = gateway.get(1.0, 2.0).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(gateway.cache.get(&CoordKey::new(1.0, 2.0)).await.is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_stale_entry_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(met_payload())
                    .insert_header("Last-Modified", LAST_MOD),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(10);
        let clock = Arc::new(ManualClock::new());
        let gateway = build_gateway(&settings, clock.clone());

        gateway.get(1.0, 2.0).await.unwrap();
        let stored = gateway.cache.get(&CoordKey::new(1.0, 2.0)).await.unwrap();

        clock.advance(Duration::from_secs(10));
        let err = gateway.get(1.0, 2.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);

        let after = gateway.cache.get(&CoordKey::new(1.0, 2.0)).await.unwrap();
        assert_eq!(after.expires_at, stored.expires_at);
        assert_eq!(after.freshness_token.as_deref(), Some(LAST_MOD));
    }

    #[tokio::test]
    async fn test_missing_user_agent_fails_before_cache() {
        let server = MockServer::start().await;
        let mut settings = met_settings(&server.uri());
        settings.user_agent = None;
        let gateway = build_gateway(&settings, Arc::new(ManualClock::new()));

        let err = gateway.get(1.0, 2.0).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().starts_with("MET_USER_AGENT is not set"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_wipes_cache_and_limiter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(met_payload()))
            .expect(2)
            .mount(&server)
            .await;

        let mut settings = met_settings(&server.uri());
        settings.cache_ttl = Duration::from_secs(300);
        settings.rate_limit_max_calls = 1;
        settings.rate_limit_period = Duration::from_secs(60);
        let gateway = build_gateway(&settings, Arc::new(ManualClock::new()));

        gateway.get(1.0, 2.0).await.unwrap();
        gateway.clear();
        gateway.get(1.0, 2.0).await.unwrap();
    }
}
