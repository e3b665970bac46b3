//! Job submission commands

use serde::{Deserialize, Serialize};
use yass_common::types::JobKind;

use crate::jobs::JobId;

pub mod submit_conversion;
pub mod submit_separation;
pub mod submit_training;
pub mod submit_tts;

pub use submit_conversion::{SubmitConversionCommand, SubmitConversionError};
pub use submit_separation::{SubmitSeparationCommand, SubmitSeparationError};
pub use submit_training::{SubmitTrainingCommand, SubmitTrainingError};
pub use submit_tts::{SubmitTtsCommand, SubmitTtsError};

/// Body of a `202 Accepted` submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub kind: JobKind,
}
