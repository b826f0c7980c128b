//! Per-virtual-user HTTP mechanism: a [`Runner`] performs one fetch and
//! reports timing, status and cache information back to its [`Schedule`](crate::schedule).

mod chrome;
mod fake;

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use chrome::ChromeRunner;
pub use fake::FakeRunner;

/// Measurement produced by one completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub ttfb: Duration,
    pub http_status_code: i32,
    pub http_status_message: String,
    pub cached: bool,
}

/// Errors a [`Runner::call`] can surface. Distinguishing `Cancelled` lets the
/// schedule loop exit cleanly instead of propagating an error.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("context cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("no network event for base url found")]
    NoNetworkEventFound,
    #[error("browser protocol error: {0}")]
    Protocol(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to configure browser: {0}")]
    Launch(String),
}

/// A closed set of runner variants, dispatched on by [`Runner::call`].
///
/// A small enum rather than a trait object: the only polymorphic operation is
/// `call`, and the set of kinds is fixed (see spec §9 "Polymorphic Runner").
pub enum Runner {
    Fake(FakeRunner),
    Chrome(ChromeRunner),
}

impl Runner {
    /// Derives a scoped execution context for this runner: launches whatever
    /// per-runner resources the variant needs (browser process, cache
    /// directory, event buffer) and arranges for their release once `cancel`
    /// fires.
    pub async fn derive_context(&mut self, cancel: CancellationToken) -> Result<(), RunnerError> {
        match self {
            Runner::Fake(_) => Ok(()),
            Runner::Chrome(r) => r.derive_context(cancel).await,
        }
    }

    /// Performs one fetch against `url`, normalizing a single trailing `/`
    /// before comparison as the spec requires.
    pub async fn call(&mut self, url: &str) -> Result<CallResult, RunnerError> {
        let url = url.strip_suffix('/').unwrap_or(url);
        match self {
            Runner::Fake(r) => r.call(url).await,
            Runner::Chrome(r) => r.call(url).await,
        }
    }
}

/// Name of the global directory under which every chrome runner's cache
/// directory is nested, ported verbatim from the original Go implementation's
/// `CacheDirName` constant.
pub const CACHE_DIR_NAME: &str = "loago_runner";

/// Capacity of a chrome runner's bounded network-event buffer.
pub const NETWORK_EVENT_BUFFER_SIZE: usize = 300;
