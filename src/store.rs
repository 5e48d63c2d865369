//! Key-value persistence contract.
//!
//! Conversation contexts and actor nodes are externalized between calls
//! through this narrow interface: `get` / `set` (with optional TTL) /
//! `delete` / prefix-scanned `keys`. Values are UTF-8 JSON strings. The
//! backend is pluggable — the bundled [`MemKvStore`] keeps everything in
//! process memory; a durable backend satisfying the same contract can be
//! swapped in by the embedding service.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The persistence contract this core depends on.
pub trait KvStore: Send + Sync {
    /// Fetch a value. Expired or missing keys yield `Ok(None)`.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Insert or replace a value, optionally expiring after `ttl`.
    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    fn delete(&self, key: &str) -> StoreResult<()>;

    /// All live keys starting with `prefix`.
    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory store backed by a concurrent hashmap. All data is lost on
/// process exit; TTLs are enforced lazily on access.
#[derive(Default)]
pub struct MemKvStore {
    data: DashMap<String, Entry>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        self.data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| !entry.is_expired() && entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
