use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use shared_config::AppConfig;

use crate::models::{BucketConfig, EndpointClass, TokenBucket};

const GC_INTERVAL: Duration = Duration::from_secs(600);
const IDLE_THRESHOLD: Duration = Duration::from_secs(600);

pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Per-(client ip, endpoint class) token-bucket admission control. The bucket map is a single
/// process-wide `RwLock<HashMap<...>>`, closing the gap left by the teacher's prototype sliding
/// window limiter, which kept its window map behind a lock but never reasoned about unbounded
/// growth — this adds the periodic sweep that one was missing.
pub struct RateLimiter {
    enabled: bool,
    default_config: BucketConfig,
    buckets: RwLock<HashMap<(String, EndpointClass), TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            default_config: BucketConfig {
                requests_per_second: config.rate_limit_rps,
                burst: config.rate_limit_burst,
            },
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn config_for(&self, class: EndpointClass) -> BucketConfig {
        match class {
            EndpointClass::Auth => BucketConfig {
                requests_per_second: self.default_config.requests_per_second.max(5),
                burst: self.default_config.burst.max(10),
            },
            _ => self.default_config,
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, client_ip: &str, class: EndpointClass) -> RateLimitDecision {
        let config = self.config_for(class);

        if !self.enabled {
            return RateLimitDecision {
                allowed: true,
                limit: config.requests_per_second,
                remaining: config.burst,
            };
        }

        let key = (client_ip.to_string(), class);
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(config));

        let allowed = bucket.try_consume();
        RateLimitDecision {
            allowed,
            limit: config.requests_per_second,
            remaining: bucket.remaining(),
        }
    }

    pub async fn gc_sweep(&self) {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.idle_for(IDLE_THRESHOLD));
        let removed = before - buckets.len();
        if removed > 0 {
            debug!("rate limiter GC removed {} idle buckets", removed);
        }
    }

    pub fn spawn_gc_task(self: std::sync::Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GC_INTERVAL);
            loop {
                interval.tick().await;
                self.gc_sweep().await;
            }
        });
        info!("rate limiter GC task started, sweeping every {:?}", GC_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rps: u32, burst: u32) -> AppConfig {
        AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            redis_addr: String::new(),
            redis_password: None,
            cache_default_ttl_secs: 900,
            rate_limit_enabled: true,
            rate_limit_rps: rps,
            rate_limit_burst: burst,
            allowed_origins: vec![],
            port: 8080,
            environment: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn exhausting_burst_rejects_the_next_request() {
        let limiter = RateLimiter::new(&config(1, 2));

        let first = limiter.check("1.2.3.4", EndpointClass::Default).await;
        let second = limiter.check("1.2.3.4", EndpointClass::Default).await;
        let third = limiter.check("1.2.3.4", EndpointClass::Default).await;

        assert!(first.allowed);
        assert!(second.allowed);
        assert!(!third.allowed);
    }

    #[tokio::test]
    async fn distinct_endpoint_classes_have_independent_buckets() {
        let limiter = RateLimiter::new(&config(1, 1));

        let doctor = limiter.check("1.2.3.4", EndpointClass::Doctor).await;
        let appointment = limiter.check("1.2.3.4", EndpointClass::Appointment).await;

        assert!(doctor.allowed);
        assert!(appointment.allowed);
    }

    #[tokio::test]
    async fn disabled_limiter_always_allows() {
        let mut cfg = config(1, 1);
        cfg.rate_limit_enabled = false;
        let limiter = RateLimiter::new(&cfg);

        for _ in 0..10 {
            assert!(limiter.check("1.2.3.4", EndpointClass::Default).await.allowed);
        }
    }

    #[tokio::test]
    async fn gc_sweep_removes_idle_buckets() {
        let limiter = RateLimiter::new(&config(10, 10));
        limiter.check("1.2.3.4", EndpointClass::Default).await;
        assert_eq!(limiter.buckets.read().await.len(), 1);

        {
            let mut buckets = limiter.buckets.write().await;
            for bucket in buckets.values_mut() {
                bucket.last_seen -= Duration::from_secs(700);
            }
        }

        limiter.gc_sweep().await;
        assert_eq!(limiter.buckets.read().await.len(), 0);
    }
}
