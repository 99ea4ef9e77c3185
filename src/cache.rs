//! TTL-bounded response cache for the repository client.
//!
//! Entries expire a fixed duration after insertion. Expired entries are
//! treated as absent on read and dropped lazily.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().ok()?;
        match entries.get(key) {
            Some((expires, value)) if Instant::now() < *expires => Some(value.clone()),
            _ => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            let now = Instant::now();
            entries.retain(|_, (expires, _)| now < *expires);
            entries.insert(key.into(), (now + self.ttl, value));
        }
    }

    /// Drops every entry and returns how many were held.
    pub fn clear(&self) -> usize {
        match self.entries.write() {
            Ok(mut entries) => {
                let n = entries.len();
                entries.clear();
                n
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
