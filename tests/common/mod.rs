use std::sync::Arc;

use idempotency_gate::gate::IdempotencyGate;
use idempotency_gate::store::{MemoryRecordStore, RecordStore};

pub const TEST_TTL_SECONDS: u64 = 60;

/// Gate over a fresh in-process store, the default harness for protocol tests.
pub fn setup_gate() -> (Arc<IdempotencyGate>, Arc<MemoryRecordStore>) {
    setup_gate_with_ttl(TEST_TTL_SECONDS)
}

pub fn setup_gate_with_ttl(ttl_seconds: u64) -> (Arc<IdempotencyGate>, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let gate = Arc::new(IdempotencyGate::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        ttl_seconds,
    ));
    (gate, store)
}

/// Redis store for backend tests; None when no server is configured.
pub async fn setup_redis_store() -> Option<idempotency_gate::store::RedisRecordStore> {
    dotenvy::dotenv().ok();

    let url = std::env::var("REDIS_URL").ok()?;
    let client = redis::Client::open(url).ok()?;
    let mut conn = client.get_multiplexed_async_connection().await.ok()?;
    let _: () = redis::cmd("PING").query_async(&mut conn).await.ok()?;

    Some(idempotency_gate::store::RedisRecordStore::new(
        client,
        format!("idem_test_{}", uuid::Uuid::new_v4()),
    ))
}
