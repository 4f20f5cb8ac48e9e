//! service-core: shared infrastructure for the billing portal services.
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use tracing;
pub use validator;
