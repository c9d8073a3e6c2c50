//! Cache backend interface used for whole-resultset caching.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default lifetime of a cached resultset in seconds.
pub const DEFAULT_CACHE_LIFETIME: u64 = 3600;

/// Default service name of the models cache.
pub const DEFAULT_CACHE_SERVICE: &str = "modelsCache";

/// Per-query caching options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    pub key: Option<String>,
    pub lifetime: Option<u64>,
    pub service: Option<String>,
}

impl CacheOptions {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn lifetime(mut self, seconds: u64) -> Self {
        self.lifetime = Some(seconds);
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Keyed storage with a time to live.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str, lifetime: Option<u64>) -> Option<serde_json::Value>;

    fn save(&self, key: &str, value: serde_json::Value, lifetime: u64) -> Result<()>;

    fn exists(&self, key: &str) -> bool;

    fn delete(&self, key: &str) -> bool;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, serde_json::Value)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str, _lifetime: Option<u64>) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((expires, _)) if *expires <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((_, value)) => Some(value.clone()),
            None => None,
        }
    }

    fn save(&self, key: &str, value: serde_json::Value, lifetime: u64) -> Result<()> {
        let expires = Instant::now() + Duration::from_secs(lifetime);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (expires, value));
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.get(key, None).is_some()
    }

    fn delete(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some()
    }
}
