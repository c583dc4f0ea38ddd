// JSON values behind KvStore, keyed by request fingerprint. Read errors count
// as misses and write errors are only logged.

use crate::calendar::CalendarDate;
use crate::model::{ButtonName, Occupancy, SearchCriteria};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ENTRIES: usize = 500;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache codec error: {0}")]
    Codec(String),
}

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub search: Duration,
    pub availability: Duration,
    pub product: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(300),
            availability: Duration::from_secs(300),
            product: Duration::from_secs(600),
        }
    }
}

// SHA-256 of the normalized request, namespaced by operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn search(criteria: &SearchCriteria) -> Self {
        Self::digest("search", &criteria.normalized())
    }

    pub fn availability(
        code: &str,
        from: CalendarDate,
        to: CalendarDate,
        occupancy: &Occupancy,
    ) -> Self {
        Self::digest(
            "availability",
            &(normalize_code(code), from, to, occupancy),
        )
    }

    pub fn product(code: &str) -> Self {
        Self::digest("product", &normalize_code(code))
    }

    pub fn destinations(button: &ButtonName) -> Self {
        Self::digest("destinations", &button.as_str().trim().to_lowercase())
    }

    fn digest<T: Serialize>(namespace: &str, value: &T) -> Self {
        // Plain data with string keys; serialization cannot fail
        let canonical = serde_json::to_vec(value).unwrap_or_default();
        let hash = Sha256::digest(&canonical);
        Fingerprint(format!("{namespace}:{}", hex::encode(hash)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub write_count: AtomicUsize,
    pub write_failures: AtomicUsize,
    pub read_failures: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub hit_count: usize,
    pub miss_count: usize,
    pub write_count: usize,
    pub write_failures: usize,
    pub read_failures: usize,
}

impl CacheStats {
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            write_count: self.write_count.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: CacheTtl,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: CacheTtl) -> Self {
        Self {
            store,
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> &CacheTtl {
        &self.ttl
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        let raw = match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "cache read failed, treating as miss");
                self.stats.read_failures.fetch_add(1, Ordering::Relaxed);
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!(key = key.as_str(), "cache hit");
                self.stats.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "undecodable cache entry, treating as miss");
                self.stats.read_failures.fetch_add(1, Ordering::Relaxed);
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set<T: Serialize + Sync>(&self, key: &Fingerprint, value: &T, ttl: Duration) {
        let result = match serde_json::to_vec(value) {
            Ok(raw) => self.store.set(key.as_str(), Bytes::from(raw), ttl).await,
            Err(e) => Err(CacheError::Codec(e.to_string())),
        };
        match result {
            Ok(()) => {
                self.stats.write_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "cache write failed");
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> CacheStatsReport {
        self.stats.report()
    }
}

struct CacheEntry {
    data: Bytes,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

// Concurrent in-process store. Single process only; bounded by entry count.
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    evictions: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            evictions: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn eviction_count(&self) -> usize {
        self.evictions.load(Ordering::Relaxed)
    }

    // Drop expired entries first, then the oldest, until one slot is free
    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let mut evicted = before.saturating_sub(self.entries.len());

        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        evicted += 1;
                    }
                }
                None => break,
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        if !self.entries.contains_key(key) {
            self.make_room();
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }
}

#[derive(Deserialize)]
struct UpstashReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

// Upstash-compatible REST store: commands are POSTed as JSON arrays.
pub struct UpstashStore {
    http: reqwest::Client,
    url: Url,
    token: String,
    timeout: Duration,
}

impl UpstashStore {
    pub fn new(url: Url, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            token: token.into(),
            timeout,
        }
    }

    async fn command(&self, command: &[&str]) -> Result<Option<serde_json::Value>, CacheError> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(command)
            .send()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let status = response.status();
        let reply: UpstashReply = response
            .json()
            .await
            .map_err(|e| CacheError::Backend(format!("HTTP {status}: {e}")))?;
        if let Some(error) = reply.error {
            return Err(CacheError::Backend(error));
        }
        if !status.is_success() {
            return Err(CacheError::Backend(format!("HTTP {status}")));
        }
        Ok(reply.result)
    }
}

#[async_trait]
impl KvStore for UpstashStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        match self.command(&["GET", key]).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(text)) => Ok(Some(Bytes::from(text))),
            Some(other) => Err(CacheError::Codec(format!("unexpected GET result {other}"))),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let text = std::str::from_utf8(&value).map_err(|e| CacheError::Codec(e.to_string()))?;
        let seconds = ttl.as_secs().max(1).to_string();
        self.command(&["SET", key, text, "EX", &seconds]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ButtonName;
    use mockito::Matcher;
    use serde_json::json;

    fn date(s: &str) -> CalendarDate {
        CalendarDate::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_round_trip_and_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty(), "expired entry is dropped on read");
    }

    #[tokio::test]
    async fn test_memory_store_evicts_oldest_when_full() {
        let store = MemoryStore::with_max_entries(3);
        for key in ["a", "b", "c", "d"] {
            store
                .set(key, Bytes::from(key), Duration::from_secs(60))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.get("d").await.unwrap().is_some());
        assert_eq!(store.eviction_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_prefers_evicting_expired_entries() {
        let store = MemoryStore::with_max_entries(2);
        store
            .set("old", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("stale", Bytes::from_static(b"2"), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        store
            .set("new", Bytes::from_static(b"3"), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.get("old").await.unwrap().is_some());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_under_concurrent_writers() {
        let store = Arc::new(MemoryStore::with_max_entries(64));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let key = format!("w{worker}-{i}");
                    store
                        .set(&key, Bytes::from(key.clone()), Duration::from_secs(60))
                        .await
                        .unwrap();
                    let _ = store.get(&key).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(store.len() <= 64 + 8, "bounded within racing writers: {}", store.len());
    }

    #[test]
    fn test_fingerprint_normalization_and_namespacing() {
        let a = SearchCriteria::new(ButtonName::DayTours)
            .destination("Cape Town")
            .dates(date("2025-10-01"), date("2025-10-03"));
        let b = SearchCriteria::new(ButtonName::DayTours)
            .destination(" CAPE TOWN ")
            .dates(date("2025-10-01"), date("2025-10-03"));
        assert_eq!(Fingerprint::search(&a), Fingerprint::search(&b));
        assert!(Fingerprint::search(&a).as_str().starts_with("search:"));

        let c = b.clone().travelers(3, 0);
        assert_ne!(Fingerprint::search(&a), Fingerprint::search(&c));

        assert_eq!(Fingerprint::product(" cptdt01 "), Fingerprint::product("CPTDT01"));
        assert!(Fingerprint::product("X").as_str().starts_with("product:"));
        let occupancy = Occupancy::default();
        let availability =
            Fingerprint::availability("X", date("2025-10-01"), date("2025-10-02"), &occupancy);
        assert!(availability.as_str().starts_with("availability:"));
        assert_eq!(availability.as_str().len(), "availability:".len() + 64);
    }

    #[test]
    fn test_fingerprint_is_lowercase_hex_sha256() {
        let expected = hex::encode(Sha256::digest(br#""CPTDT01""#));
        assert_eq!(Fingerprint::product("cptdt01").as_str(), format!("product:{expected}"));
        assert!(expected.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let destinations = Fingerprint::destinations(&ButtonName::GroupTours);
        assert!(destinations.as_str().starts_with("destinations:"));
        assert_ne!(destinations, Fingerprint::destinations(&ButtonName::Rail));
    }

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_backend_failures_degrade_to_misses() {
        let cache = ResponseCache::new(Arc::new(BrokenStore), CacheTtl::default());
        let key = Fingerprint::product("X");
        cache.set(&key, &vec![1, 2, 3], Duration::from_secs(5)).await;
        assert_eq!(cache.get::<Vec<i32>>(&key).await, None);

        let stats = cache.stats();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.read_failures, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[tokio::test]
    async fn test_response_cache_hits() {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), CacheTtl::default());
        let key = Fingerprint::product("X");
        assert_eq!(cache.get::<String>(&key).await, None);
        cache.set(&key, &"value".to_string(), Duration::from_secs(5)).await;
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("value"));
        assert_eq!(
            cache.stats(),
            CacheStatsReport {
                hit_count: 1,
                miss_count: 1,
                write_count: 1,
                write_failures: 0,
                read_failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_upstash_store_speaks_rest_commands() {
        let mut server = mockito::Server::new_async().await;
        let set = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!(["SET", "product:abc", "{\"a\":1}", "EX", "600"])))
            .with_status(200)
            .with_body(r#"{"result":"OK"}"#)
            .create_async()
            .await;
        let get = server
            .mock("POST", "/")
            .match_body(Matcher::Json(json!(["GET", "product:abc"])))
            .with_status(200)
            .with_body(r#"{"result":"{\"a\":1}"}"#)
            .create_async()
            .await;

        let store = UpstashStore::new(
            Url::parse(&server.url()).unwrap(),
            "tok",
            Duration::from_secs(2),
        );
        store
            .set("product:abc", Bytes::from_static(b"{\"a\":1}"), Duration::from_secs(600))
            .await
            .unwrap();
        let value = store.get("product:abc").await.unwrap().unwrap();
        assert_eq!(&value[..], b"{\"a\":1}");

        set.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_upstash_errors_surface_as_backend_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(401)
            .with_body(r#"{"error":"WRONGPASS invalid token"}"#)
            .create_async()
            .await;
        let store = UpstashStore::new(
            Url::parse(&server.url()).unwrap(),
            "bad",
            Duration::from_secs(2),
        );
        match store.get("k").await {
            Err(CacheError::Backend(message)) => assert!(message.contains("WRONGPASS")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
