//! Observability module - request IDs and response timing.

mod request_id;
mod response_time;

pub use request_id::{RequestId, RequestIdMiddleware};
pub use response_time::ResponseTimeMiddleware;
