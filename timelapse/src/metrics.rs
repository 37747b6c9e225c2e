//! Job metrics recorded through the `metrics` facade.
//!
//! HTTP-level metrics come from `axum-prometheus` when `enable_metrics` is set. These add one
//! counter and one histogram per upload, labelled by how the job ended. Without an installed
//! recorder the macros are no-ops.

use crate::errors::Error;
use crate::transcoder::TranscodeError;
use std::time::Duration;

pub const JOBS_TOTAL: &str = "timelapse_jobs_total";
pub const JOB_DURATION_SECONDS: &str = "timelapse_job_duration_seconds";

/// How an upload request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Validation failed before the transcoder ran
    Rejected,
    Unavailable,
    TimedOut,
    Failed,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Unavailable => "unavailable",
            Outcome::TimedOut => "timed_out",
            Outcome::Failed => "failed",
            Outcome::Error => "error",
        }
    }

    pub fn of<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(Error::BadRequest { .. } | Error::PayloadTooLarge { .. }) => Outcome::Rejected,
            Err(Error::TranscoderUnavailable { .. }) => Outcome::Unavailable,
            Err(Error::Transcode(TranscodeError::TimedOut { .. })) => Outcome::TimedOut,
            Err(Error::Transcode(TranscodeError::Failed { .. })) => Outcome::Failed,
            Err(_) => Outcome::Error,
        }
    }
}

pub fn record_job(outcome: Outcome, elapsed: Duration) {
    ::metrics::counter!(JOBS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    ::metrics::histogram!(JOB_DURATION_SECONDS, "outcome" => outcome.as_str()).record(elapsed.as_secs_f64());
}
