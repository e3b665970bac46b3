//! Job queries

pub mod get_result;
pub mod get_status;

pub use get_result::{GetJobResultQuery, JobResultResponse};
pub use get_status::{GetJobStatusQuery, JobStatusResponse};
