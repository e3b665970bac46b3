//! Stream feature module
//!
//! Serves separated stems straight from the workspace that produced them.

pub mod queries;
pub mod routes;

pub use routes::stream_routes;
