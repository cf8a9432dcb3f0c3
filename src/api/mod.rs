pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

pub use middleware::{idempotency_middleware, IDEMPOTENCY_KEY_HEADER, REPLAYED_HEADER};
pub use routes::{create_router, AppState};
