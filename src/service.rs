//! Spawns N schedules against a weighted endpoint set and joins them.

use std::time::Duration;

use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    runner::{ChromeRunner, FakeRunner, Runner, RunnerError},
    schedule::{self, EndpointResult, ScheduleError},
};

/// A URL with a relative selection frequency. Weight 0 means never selected.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserType {
    Fake,
    Chrome,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid runner type")]
    InvalidRunnerType,
    #[error("max wait duration is bigger than min wait duration")]
    InvalidWaitBoundaries,
    #[error("all endpoint weights are zero")]
    AllWeightsZero,
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl From<ScheduleError> for ServiceError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::InvalidWaitBoundaries => ServiceError::InvalidWaitBoundaries,
            ScheduleError::Runner(r) => ServiceError::Runner(r),
        }
    }
}

/// Builds the flat, weight-expanded endpoint list: each endpoint appears
/// `weight` times, turning weighted selection into uniform indexing.
fn expand_weights(endpoints: &[Endpoint]) -> Vec<String> {
    let mut flat = Vec::new();
    for e in endpoints {
        for _ in 0..e.weight {
            flat.push(e.url.clone());
        }
    }
    flat
}

/// Performs continuous requests against `endpoints` using `amount` virtual
/// users of kind `browser_type`, until `cancel` fires or a schedule fails.
/// The caller owns `results` and must drain it; this function never closes
/// it (so that a channel shared across concurrent `run` calls on one worker
/// is safe against the other calls still writing).
pub async fn run(
    cancel: CancellationToken,
    browser_type: BrowserType,
    endpoints: Vec<Endpoint>,
    min_wait: Duration,
    max_wait: Duration,
    amount: u32,
    results: mpsc::Sender<EndpointResult>,
) -> Result<(), ServiceError> {
    tracing::info!(component = "loadtest_service", "starting a new loadtest");

    if amount == 0 {
        return Ok(());
    }

    let flat_endpoints = expand_weights(&endpoints);
    if flat_endpoints.is_empty() {
        return Err(ServiceError::AllWeightsZero);
    }
    if min_wait > max_wait {
        return Err(ServiceError::InvalidWaitBoundaries);
    }

    let service_cancel = cancel.child_token();
    let mut joins: JoinSet<Result<(), ScheduleError>> = JoinSet::new();

    for id in 0..amount as usize {
        let mut runner = match browser_type {
            BrowserType::Fake => Runner::Fake(FakeRunner::new(id, service_cancel.clone())),
            BrowserType::Chrome => Runner::Chrome(ChromeRunner::new(id)),
        };

        runner.derive_context(service_cancel.clone()).await?;

        let endpoints = flat_endpoints.clone();
        let results = results.clone();
        let run_cancel = service_cancel.clone();
        joins.spawn(async move {
            schedule::run(id, runner, endpoints, min_wait, max_wait, results, run_cancel).await
        });
    }

    let outcome = loop {
        match joins.join_next().await {
            None => break Ok(()),
            Some(Err(join_err)) => {
                tracing::error!(component = "loadtest_service", error = %join_err, "schedule task panicked");
                break Ok(());
            }
            Some(Ok(Err(e))) => break Err(e.into()),
            Some(Ok(Ok(()))) => continue,
        }
    };

    service_cancel.cancel();
    while joins.join_next().await.is_some() {}

    if outcome.is_ok() {
        tracing::info!(component = "loadtest_service", "schedules finished work successfully");
    }

    outcome
}
