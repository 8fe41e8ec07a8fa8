//! HTTP surface: router, handlers, middleware and error mapping.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod types;

pub use router::build_router;
pub use types::ApiContext;
