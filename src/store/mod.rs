pub mod memory_store;
pub mod redis_store;

pub use memory_store::MemoryRecordStore;
pub use redis_store::RedisRecordStore;

use async_trait::async_trait;

use crate::error::Result;

/// Key-value contract consumed by the gate.
///
/// Entries carry an absolute expiration measured from the write instant; the
/// store never receives explicit deletes from the gate. `put_if_absent` is the
/// atomic conditional insert the entry protocol relies on to arbitrate
/// concurrent first requests for a key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the stored bytes for a key, or None if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditional upsert with a fresh absolute expiration.
    async fn put(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()>;

    /// Atomically inserts only when the key is absent. Returns true if this
    /// call created the entry, false if a live entry already existed.
    async fn put_if_absent(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<bool>;
}
