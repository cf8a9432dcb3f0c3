use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;
use crate::store::RecordStore;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process record store for tests and single-node deployments.
///
/// Expiry is lazy: reads treat a past-deadline entry as absent, and
/// `put_if_absent` overwrites it. `sweep` exists for long-running processes
/// that want to reclaim memory for keys nobody asks about again.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().expect("memory store lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live entries, for stats and tests.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().expect("memory store lock poisoned");
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let entries = self.entries.read().expect("memory store lock poisoned");
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        let entry = StoredEntry {
            value: value.to_vec(),
            expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
        };
        let mut entries = self.entries.write().expect("memory store lock poisoned");
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().expect("memory store lock poisoned");

        if let Some(existing) = entries.get(key) {
            if existing.is_live(now) {
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_vec(),
                expires_at: now + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(true)
    }
}
