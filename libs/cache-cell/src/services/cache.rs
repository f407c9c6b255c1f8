use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::CacheHealth;

/// Thin, fully generic read-through/invalidate wrapper around Redis. Callers build their own
/// key strings and own the mapping between a key and the type stored under it; this service
/// only knows how to move JSON bytes in and out, the same way the queue service in the
/// notification cell treats job payloads as opaque strings.
pub struct CacheService {
    pool: Option<Pool>,
    default_ttl_secs: u64,
}

impl CacheService {
    pub fn new(config: &AppConfig) -> Self {
        let pool = if config.is_cache_configured() {
            let url = match &config.redis_password {
                Some(password) => with_password(&config.redis_addr, password),
                None => config.redis_addr.clone(),
            };
            let cfg = Config::from_url(url);
            match cfg.create_pool(Some(Runtime::Tokio1)) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("failed to build redis pool, cache disabled: {}", e);
                    None
                }
            }
        } else {
            debug!("no redis address configured, cache disabled");
            None
        };

        Self {
            pool,
            default_ttl_secs: config.cache_default_ttl_secs,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let pool = self.pool.as_ref()?;
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("cache get({}) connection error: {}", key, e);
                return None;
            }
        };

        let raw: Option<String> = match conn.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!("cache get({}) failed: {}", key, e);
                return None;
            }
        };

        raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(value) => {
                debug!("cache hit for {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("cache value for {} failed to deserialize: {}", key, e);
                None
            }
        })
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        self.put_with_ttl(key, value, self.default_ttl_secs).await
    }

    pub async fn put_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };

        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to serialize cache value for {}: {}", key, e);
                return;
            }
        };

        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("cache put({}) connection error: {}", key, e);
                return;
            }
        };

        let result: redis::RedisResult<()> = conn.set_ex(key, encoded, ttl_secs).await;
        if let Err(e) = result {
            warn!("cache put({}) failed: {}", key, e);
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };

        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("cache invalidate({}) connection error: {}", key, e);
                return;
            }
        };

        let result: redis::RedisResult<()> = conn.del(key).await;
        if let Err(e) = result {
            warn!("cache invalidate({}) failed: {}", key, e);
        }
    }

    pub async fn health(&self) -> CacheHealth {
        let Some(pool) = self.pool.as_ref() else {
            return CacheHealth {
                reachable: false,
                detail: "cache not configured".to_string(),
            };
        };

        match pool.get().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => CacheHealth {
                    reachable: true,
                    detail: "ok".to_string(),
                },
                Err(e) => CacheHealth {
                    reachable: false,
                    detail: e.to_string(),
                },
            },
            Err(e) => CacheHealth {
                reachable: false,
                detail: e.to_string(),
            },
        }
    }
}

fn with_password(addr: &str, password: &str) -> String {
    match addr.strip_prefix("redis://") {
        Some(rest) => format!("redis://:{}@{}", password, rest),
        None => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> AppConfig {
        AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            redis_addr: String::new(),
            redis_password: None,
            cache_default_ttl_secs: 900,
            rate_limit_enabled: false,
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            allowed_origins: vec![],
            port: 8080,
            environment: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn unconfigured_cache_reports_unreachable_and_degrades_silently() {
        let cache = CacheService::new(&unconfigured());
        let health = cache.health().await;
        assert!(!health.reachable);

        cache.put("k", &"v").await;
        let got: Option<String> = cache.get("k").await;
        assert_eq!(got, None);
    }
}
