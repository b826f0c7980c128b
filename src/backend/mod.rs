//! Persistence of load-test results.

pub mod file;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub use file::FileDataBackend;

/// One stored fetch result, independent of which worker produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResult {
    pub url: String,
    #[serde(rename = "httpstatuscode")]
    pub http_status_code: i32,
    #[serde(rename = "httpstatusmessage")]
    pub http_status_message: String,
    #[serde(rename = "ttfb", with = "ttfb_nanos")]
    pub ttfb: Duration,
    pub cached: bool,
}

/// Persisted `ttfb` is nanoseconds, matching the original's bare
/// `time.Duration` (an `int64` count of nanoseconds) marshalling.
mod ttfb_nanos {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.as_nanos() as i64)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Abstracts over how a `StoredResult` is durably stored; the worker side
/// never sees this, only the instructor's run controller.
pub trait DataBackend {
    fn store(&mut self, result: &StoredResult) -> Result<(), BackendError>;
    fn close(&mut self) -> Result<(), BackendError>;
}
