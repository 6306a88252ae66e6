// Kilo Engine — Cache Service
// Write-through JSON cache for bot config, active skills, table schemas,
// and model pricing. Every backend operation is wrapped in a 100 ms hard
// ceiling; on timeout or backend error the caller falls through to the
// source of truth — a cache outage is never a user-visible failure.
// Explicit invalidation is the primary freshness mechanism; TTLs are a
// safety net.
//
// Reads deserialize through serde, so ISO-8601 strings revive into
// `chrono::DateTime` fields on the way out — the stored form is plain
// JSON text.

use async_trait::async_trait;
use log::warn;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::atoms::constants::{CACHE_DEFAULT_TTL, CACHE_OP_TIMEOUT};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::CacheBackend;

// ── Key layout ──────────────────────────────────────────────────────────

pub mod keys {
    use uuid::Uuid;

    pub fn bot_config(bot_id: Uuid) -> String {
        format!("bot:{}:config", bot_id)
    }

    pub fn bot_skills(bot_id: Uuid) -> String {
        format!("bot:{}:skills", bot_id)
    }

    pub fn bot_schemas(bot_id: Uuid) -> String {
        format!("bot:{}:schemas", bot_id)
    }

    pub fn pricing() -> String {
        "pricing:models".into()
    }
}

// ── Service ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Read a cached value. Returns None on miss, malformed payload,
    /// backend error, or the 100 ms ceiling — never an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let read = tokio::time::timeout(CACHE_OP_TIMEOUT, self.backend.get(key)).await;
        match read {
            Ok(Ok(Some(raw))) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("[cache] malformed payload under '{}': {}", key, e);
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!("[cache] get '{}' failed: {}", key, e);
                None
            }
            Err(_) => {
                warn!("[cache] get '{}' exceeded {:?}", key, CACHE_OP_TIMEOUT);
                None
            }
        }
    }

    /// Write-through a value with the given TTL. Failures are logged and
    /// swallowed.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[cache] serialize for '{}' failed: {}", key, e);
                return;
            }
        };
        let write = tokio::time::timeout(CACHE_OP_TIMEOUT, self.backend.set(key, &raw, ttl)).await;
        match write {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[cache] put '{}' failed: {}", key, e),
            Err(_) => warn!("[cache] put '{}' exceeded {:?}", key, CACHE_OP_TIMEOUT),
        }
    }

    /// Cache-first read: on miss (or cache outage), run the loader, then
    /// write the fresh value through for the next reader.
    pub async fn read_through<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> EngineResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let fresh = load().await?;
        self.put(key, &fresh, ttl).await;
        Ok(fresh)
    }

    /// Delete arbitrary keys. Swallows failures.
    pub async fn invalidate(&self, keys: &[String]) {
        let del = tokio::time::timeout(CACHE_OP_TIMEOUT, self.backend.delete(keys)).await;
        match del {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[cache] invalidate failed: {}", e),
            Err(_) => warn!("[cache] invalidate exceeded {:?}", CACHE_OP_TIMEOUT),
        }
    }

    /// Invalidate a bot's three keys (config, skills, schemas) in one
    /// backend call — the required response to any skill create/update/
    /// delete or bot config update.
    pub async fn invalidate_bot(&self, bot_id: Uuid) {
        self.invalidate(&[
            keys::bot_config(bot_id),
            keys::bot_skills(bot_id),
            keys::bot_schemas(bot_id),
        ])
        .await;
    }

    pub fn default_ttl() -> Duration {
        CACHE_DEFAULT_TTL
    }
}

// ── In-memory backend ───────────────────────────────────────────────────

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local backend used in tests and single-node deployments. The
/// production backend (a networked cache) implements the same trait in
/// the host application.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> EngineResult<()> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::error::EngineError;
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Cached {
        name: String,
        created_at: DateTime<Utc>,
    }

    fn service() -> CacheService {
        CacheService::new(Arc::new(InMemoryCache::new()))
    }

    #[tokio::test]
    async fn write_through_and_read_back() {
        let cache = service();
        let value = Cached {
            name: "bot".into(),
            created_at: Utc::now(),
        };
        cache.put("k", &value, Duration::from_secs(60)).await;
        let back: Cached = cache.get("k").await.unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn iso_timestamps_revive() {
        let cache = service();
        // Simulate a foreign writer storing plain JSON text.
        cache
            .backend
            .set(
                "k",
                r#"{"name":"bot","created_at":"2026-03-01T09:30:00Z"}"#,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        let back: Cached = cache.get("k").await.unwrap();
        assert_eq!(back.created_at.to_rfc3339(), "2026-03-01T09:30:00+00:00");
    }

    #[tokio::test]
    async fn invalidation_empties_all_bot_keys() {
        let cache = service();
        let bot_id = Uuid::new_v4();
        for key in [
            keys::bot_config(bot_id),
            keys::bot_skills(bot_id),
            keys::bot_schemas(bot_id),
        ] {
            cache.put(&key, &"v".to_string(), Duration::from_secs(60)).await;
        }
        cache.invalidate_bot(bot_id).await;
        for key in [
            keys::bot_config(bot_id),
            keys::bot_skills(bot_id),
            keys::bot_schemas(bot_id),
        ] {
            assert_eq!(cache.get::<String>(&key).await, None);
        }
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let cache = service();
        cache.put("k", &1u32, Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get::<u32>("k").await, None);
    }

    struct SlowBackend;

    #[async_trait]
    impl CacheBackend for SlowBackend {
        async fn get(&self, _key: &str) -> EngineResult<Option<String>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Some("\"late\"".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> EngineResult<()> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        }
        async fn delete(&self, _keys: &[String]) -> EngineResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out_silently() {
        let cache = CacheService::new(Arc::new(SlowBackend));
        let started = Instant::now();
        assert_eq!(cache.get::<String>("k").await, None);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> EngineResult<Option<String>> {
            Err(EngineError::Cache("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> EngineResult<()> {
            Err(EngineError::Cache("connection refused".into()))
        }
        async fn delete(&self, _keys: &[String]) -> EngineResult<()> {
            Err(EngineError::Cache("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn read_through_survives_cache_outage() {
        let cache = CacheService::new(Arc::new(FailingBackend));
        let value = cache
            .read_through("k", Duration::from_secs(60), || async { Ok(42u32) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn read_through_populates_cache() {
        let cache = service();
        let v1 = cache
            .read_through("k", Duration::from_secs(60), || async { Ok(7u32) })
            .await
            .unwrap();
        assert_eq!(v1, 7);
        // Second read hits the cache; the loader would return a different
        // value if it ran.
        let v2 = cache
            .read_through("k", Duration::from_secs(60), || async { Ok(99u32) })
            .await
            .unwrap();
        assert_eq!(v2, 7);
    }
}
