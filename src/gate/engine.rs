use http::Method;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::gate::record::IdempotencyRecord;
use crate::observability::get_metrics;
use crate::observability::logging::mask_key;
use crate::store::RecordStore;

/// Keys longer than this are treated as malformed and left ungated.
pub const MAX_KEY_LENGTH: usize = 512;

/// Bound on insert retries when a key expires between the conditional insert
/// and the follow-up read.
const MAX_ENTER_ATTEMPTS: usize = 3;

/// Entry decision for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// New or re-entrant request, delegate to the handler.
    Proceed,
    /// A finished result exists; short-circuit with it verbatim.
    Replay { status_code: u16, body: String },
    /// Another request holds this key and has not finished.
    Conflict { key: String },
}

impl Decision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Decision::Proceed)
    }
}

/// Counters for gate activity.
#[derive(Debug, Default)]
pub struct GateMetrics {
    pub gated_requests: AtomicU64,
    pub proceeded: AtomicU64,
    pub replays: AtomicU64,
    pub conflicts: AtomicU64,
    pub completions: AtomicU64,
    pub failures: AtomicU64,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_gated(&self) {
        self.gated_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proceeded(&self) {
        self.proceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay(&self) {
        self.replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replay_rate(&self) -> f64 {
        let gated = self.gated_requests.load(Ordering::Relaxed);
        let replays = self.replays.load(Ordering::Relaxed);
        if gated == 0 {
            0.0
        } else {
            replays as f64 / gated as f64
        }
    }

    pub fn snapshot(&self) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            gated_requests: self.gated_requests.load(Ordering::Relaxed),
            proceeded: self.proceeded.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateMetricsSnapshot {
    pub gated_requests: u64,
    pub proceeded: u64,
    pub replays: u64,
    pub conflicts: u64,
    pub completions: u64,
    pub failures: u64,
}

impl GateMetricsSnapshot {
    pub fn replay_rate(&self) -> f64 {
        if self.gated_requests == 0 {
            0.0
        } else {
            self.replays as f64 / self.gated_requests as f64
        }
    }
}

/// Returns true for request verbs the gate applies to.
pub fn is_mutating(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Normalizes a client-supplied key: trimmed, never case-folded. Returns None
/// when the request carries no usable key, which means no gating.
fn normalize_key(key: &str) -> Option<&str> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if key.len() > MAX_KEY_LENGTH {
        tracing::warn!(
            key = %mask_key(key),
            length = key.len(),
            "Idempotency key exceeds maximum length, request left ungated"
        );
        return None;
    }
    Some(key)
}

/// Protocol engine arbitrating the idempotency-key lifecycle.
///
/// All coordination goes through the record store; the gate itself holds no
/// cross-request state beyond counters.
pub struct IdempotencyGate {
    store: Arc<dyn RecordStore>,
    ttl_seconds: u64,
    metrics: Arc<GateMetrics>,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn RecordStore>, ttl_seconds: u64) -> Self {
        Self {
            store,
            ttl_seconds,
            metrics: Arc::new(GateMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<GateMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Entry decision for a request. Never mutates a finished record and never
    /// replays an unfinished one.
    pub async fn enter(&self, method: &Method, key: &str, holder_id: &str) -> Result<Decision> {
        if !is_mutating(method) {
            return Ok(Decision::Proceed);
        }
        let Some(key) = normalize_key(key) else {
            tracing::debug!("Request is executing without idempotency key");
            return Ok(Decision::Proceed);
        };

        self.metrics.record_gated();

        let pending = IdempotencyRecord::pending(key, holder_id);
        let pending_bytes = pending.to_bytes()?;

        for _ in 0..MAX_ENTER_ATTEMPTS {
            if self
                .store
                .put_if_absent(key, &pending_bytes, self.ttl_seconds)
                .await?
            {
                self.metrics.record_proceeded();
                get_metrics().record_gate_decision("proceed");
                tracing::info!(
                    key = %mask_key(key),
                    connection_id = %holder_id,
                    "Created pending idempotency record"
                );
                return Ok(Decision::Proceed);
            }

            // Lost the insert; the stored record decides the outcome.
            let Some(stored) = self.store.get(key).await? else {
                // The entry expired between insert and read; try again.
                continue;
            };
            let record = IdempotencyRecord::from_bytes(&stored)?;

            if record.is_complete() {
                if let (Some(status_code), Some(body)) = (record.status_code, record.body) {
                    self.metrics.record_replay();
                    get_metrics().record_gate_decision("replay");
                    tracing::info!(
                        key = %mask_key(key),
                        status_code,
                        "Cached response found and returned to caller"
                    );
                    return Ok(Decision::Replay { status_code, body });
                }
                return Err(AppError::Validation(format!(
                    "Finished record for key '{}' is missing its result",
                    key
                )));
            }

            if record.connection_id == holder_id {
                // Re-entrant read of our own in-flight marker.
                self.metrics.record_proceeded();
                get_metrics().record_gate_decision("proceed");
                return Ok(Decision::Proceed);
            }

            self.metrics.record_conflict();
            get_metrics().record_gate_decision("conflict");
            tracing::error!(
                key = %mask_key(key),
                connection_id = %holder_id,
                "Request with this idempotency key is already in progress"
            );
            return Ok(Decision::Conflict {
                key: key.to_string(),
            });
        }

        self.metrics.record_failure();
        Err(AppError::Store(format!(
            "Could not arbitrate idempotency key '{}' after repeated expiry races",
            key
        )))
    }

    /// Exit finalization. With a cacheable result, writes the finished record
    /// under a fresh TTL; without one, leaves the pending record to expire.
    ///
    /// The finalizing caller must present the holder id recorded at entry;
    /// a mismatch is rejected rather than allowing the key to be hijacked.
    pub async fn finish(
        &self,
        method: &Method,
        key: &str,
        holder_id: &str,
        outcome: Option<(u16, String)>,
    ) -> Result<()> {
        if !is_mutating(method) {
            return Ok(());
        }
        let Some(key) = normalize_key(key) else {
            tracing::debug!("Request executed without idempotency key");
            return Ok(());
        };

        let Some((status_code, body)) = outcome else {
            tracing::debug!(
                key = %mask_key(key),
                "Handler produced no cacheable result, leaving record pending"
            );
            return Ok(());
        };

        if let Some(stored) = self.store.get(key).await? {
            let record = IdempotencyRecord::from_bytes(&stored)?;
            if record.connection_id != holder_id {
                self.metrics.record_failure();
                tracing::error!(
                    key = %mask_key(key),
                    connection_id = %holder_id,
                    record_connection_id = %record.connection_id,
                    "Refusing to finalize a record held by another request"
                );
                return Err(AppError::HolderMismatch(key.to_string()));
            }
            // A finished record under the same holder means a repeated finish;
            // rewriting the identical result below is harmless.
        }

        let complete = IdempotencyRecord::complete(key, holder_id, status_code, body);
        self.store
            .put(key, &complete.to_bytes()?, self.ttl_seconds)
            .await?;

        self.metrics.record_completion();
        get_metrics().record_response_cached();
        tracing::info!(
            key = %mask_key(key),
            status_code,
            "Response cached for idempotency key"
        );
        Ok(())
    }
}
