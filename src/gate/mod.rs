pub mod engine;
pub mod record;

pub use engine::{
    is_mutating, Decision, GateMetrics, GateMetricsSnapshot, IdempotencyGate, MAX_KEY_LENGTH,
};
pub use record::IdempotencyRecord;
