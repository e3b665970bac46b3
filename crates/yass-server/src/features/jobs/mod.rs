//! Jobs feature module
//!
//! Submission of media jobs and polling of their status and results. The
//! handlers only enqueue and read; job bodies run in the worker pool.

pub mod commands;
pub mod queries;
pub mod routes;


pub use routes::jobs_routes;
