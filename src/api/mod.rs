//! API Module
//!
//! HTTP handlers and routing for a cache node. Peers use the fetch route;
//! operators use stats and health.
//!
//! # Endpoints
//! - `GET /_cache/:group/:key` - Value bytes for a key
//! - `GET /stats/:group` - Group statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
