//! Snapshot cache
//!
//! Key-value storage for the latest leaderboard snapshot with a TTL.
//!
//! Strategy:
//! - Backends report failures as `CacheUnavailableError`
//! - `SnapshotCache` swallows them: a failed read is a miss, a failed write is skipped
//! - With no backend at all every read misses and the service recomputes each request

use crate::error::CacheUnavailableError;
use crate::leaderboard::LeaderboardSnapshot;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_CACHE_KEY: &str = "top_stakers_v4";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const CACHE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw string storage with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailableError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheUnavailableError>;
}

/// In-process cache for single-instance deployments.
#[derive(Default)]
pub struct MemoryCache {
    /// Map of key -> (value, expiry)
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailableError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheUnavailableError("memory cache lock poisoned".to_string()))?;

        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheUnavailableError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheUnavailableError("memory cache lock poisoned".to_string()))?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

/// Redis over the Upstash REST protocol.
///
/// Commands are POSTed as JSON arrays (`["GET", key]`) with a bearer token;
/// replies are `{"result": ...}` or `{"error": "..."}`.
pub struct UpstashCache {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl UpstashCache {
    pub fn new(url: String, token: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CACHE_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn command(&self, args: Value) -> Result<Value, CacheUnavailableError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() && body.get("error").is_none() {
            return Err(CacheUnavailableError(format!("HTTP {}", status)));
        }
        parse_reply(body)
    }
}

/// Extract `result` from an Upstash reply.
fn parse_reply(body: Value) -> Result<Value, CacheUnavailableError> {
    if let Some(error) = body.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(CacheUnavailableError(message));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| CacheUnavailableError("reply missing 'result' field".to_string()))
}

#[async_trait]
impl CacheBackend for UpstashCache {
    fn name(&self) -> &'static str {
        "upstash"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailableError> {
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(CacheUnavailableError(format!("unexpected GET reply: {}", other))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheUnavailableError> {
        // Redis rejects EX 0
        let seconds = ttl.as_secs().max(1);
        self.command(json!(["SET", key, value, "EX", seconds.to_string()]))
            .await
            .map(|_| ())
    }
}

/// Snapshot-typed, failure-tolerant view over an optional backend.
#[derive(Clone)]
pub struct SnapshotCache {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl SnapshotCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("disabled", |b| b.name())
    }

    /// Cached snapshot under `key`, or `None` on miss, error or undecodable payload.
    pub async fn get(&self, key: &str) -> Option<LeaderboardSnapshot> {
        let backend = self.backend.as_ref()?;
        let raw = match backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store `snapshot` under `key`; failures are logged and skipped.
    pub async fn set(&self, key: &str, snapshot: &LeaderboardSnapshot, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize snapshot for cache: {}", e);
                return;
            }
        };
        if let Err(e) = backend.set(key, &raw, ttl).await {
            warn!("Cache write skipped: {}", e);
        }
    }
}
