//! In-memory receipt cache for agent clients
//!
//! Keyed by content id with TTL eviction. Expired entries are dropped
//! lazily on access and in a full sweep every [`SWEEP_INTERVAL`] accesses.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Accesses between full sweeps of expired entries
const SWEEP_INTERVAL: u64 = 100;

#[derive(Debug, Clone)]
struct CacheEntry {
    token: String,
    expires_at: u64,
}

/// Receipt cache mapping content ids to unexpired receipt tokens
#[derive(Debug, Default)]
pub struct ReceiptCache {
    entries: HashMap<String, CacheEntry>,
    accesses: u64,
}

impl ReceiptCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token for `content_id`, valid for `ttl_ms` milliseconds
    pub fn set(&mut self, content_id: impl Into<String>, token: impl Into<String>, ttl_ms: u64) {
        self.set_at(content_id, token, ttl_ms, now_ms());
    }

    /// Return the cached token for `content_id` if it has not expired.
    /// An expired entry is removed and `None` returned.
    pub fn get(&mut self, content_id: &str) -> Option<String> {
        self.get_at(content_id, now_ms())
    }

    /// Drop the entry for `content_id`
    pub fn evict(&mut self, content_id: &str) {
        self.entries.remove(content_id);
    }

    /// Number of unexpired entries
    pub fn size(&mut self) -> usize {
        self.sweep(now_ms());
        self.entries.len()
    }

    /// Content ids with unexpired entries
    pub fn keys(&mut self) -> Vec<String> {
        self.sweep(now_ms());
        self.entries.keys().cloned().collect()
    }

    fn set_at(
        &mut self,
        content_id: impl Into<String>,
        token: impl Into<String>,
        ttl_ms: u64,
        now: u64,
    ) {
        self.tick(now);
        self.entries.insert(
            content_id.into(),
            CacheEntry {
                token: token.into(),
                expires_at: now + ttl_ms,
            },
        );
    }

    fn get_at(&mut self, content_id: &str, now: u64) -> Option<String> {
        self.tick(now);
        match self.entries.get(content_id) {
            Some(entry) if now <= entry.expires_at => Some(entry.token.clone()),
            Some(_) => {
                self.entries.remove(content_id);
                None
            }
            None => None,
        }
    }

    fn tick(&mut self, now: u64) {
        self.accesses += 1;
        if self.accesses % SWEEP_INTERVAL == 0 {
            self.sweep(now);
        }
    }

    fn sweep(&mut self, now: u64) {
        self.entries.retain(|_, entry| now <= entry.expires_at);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
