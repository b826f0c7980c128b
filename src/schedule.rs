//! Drives one virtual user: pace, pick an endpoint, call it, emit a result.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::runner::{Runner, RunnerError};

/// One completed fetch, ready to be forwarded to the instructor.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    pub url: String,
    pub http_status_code: i32,
    pub http_status_message: String,
    pub ttfb: Duration,
    pub cached: bool,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("max wait duration is bigger than min wait duration")]
    InvalidWaitBoundaries,
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Blocks for somewhere between `min` and `max`, inclusive of `min` and
/// exclusive of `max` when they differ.
fn wait_between(min: Duration, max: Duration) -> Result<Duration, ScheduleError> {
    if min == max {
        Ok(min)
    } else if min > max {
        Err(ScheduleError::InvalidWaitBoundaries)
    } else {
        Ok(rand::thread_rng().gen_range(min..max))
    }
}

/// Runs one virtual user until `cancel` fires: sleep, pick an endpoint
/// uniformly from the (already weight-expanded) `endpoints` slice, call it,
/// and forward the result. Loops until cancelled.
///
/// `deadline-exceeded` is logged and the loop continues without emitting a
/// result; any other runner error terminates the schedule, propagating the
/// error to the caller (who cancels every sibling schedule).
pub async fn run(
    id: usize,
    mut runner: Runner,
    endpoints: Vec<String>,
    min_wait: Duration,
    max_wait: Duration,
    results: mpsc::Sender<EndpointResult>,
    cancel: CancellationToken,
) -> Result<(), ScheduleError> {
    tracing::info!(component = "schedule", id, "start new schedule");

    loop {
        let wait = match wait_between(min_wait, max_wait) {
            Ok(d) => d,
            Err(e) => return Err(e),
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(component = "schedule", id, "stop schedule");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if cancel.is_cancelled() {
            tracing::info!(component = "schedule", id, "stop schedule");
            return Ok(());
        }

        let url = &endpoints[rand::thread_rng().gen_range(0..endpoints.len())];

        match runner.call(url).await {
            Ok(res) => {
                let sent = results
                    .send(EndpointResult {
                        url: url.clone(),
                        http_status_code: res.http_status_code,
                        http_status_message: res.http_status_message,
                        ttfb: res.ttfb,
                        cached: res.cached,
                    })
                    .await;
                if sent.is_err() {
                    // receiver gone: treat like cancellation, nothing left to do.
                    return Ok(());
                }
            }
            Err(RunnerError::Cancelled) => {
                tracing::debug!(component = "schedule", id, "context cancelled mid request");
                return Ok(());
            }
            Err(RunnerError::DeadlineExceeded) => {
                tracing::warn!(component = "schedule", id, "request timed out");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn equal_bounds_are_fixed() {
        let d = Duration::from_millis(100);
        assert_eq!(wait_between(d, d).unwrap(), d);
    }

    #[test_case(2, 1; "min greater than max")]
    #[test_case(500, 1; "min far greater than max")]
    fn inverted_bounds_are_rejected(min_secs: u64, max_secs: u64) {
        let err = wait_between(Duration::from_secs(min_secs), Duration::from_secs(max_secs))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidWaitBoundaries));
    }

    #[test]
    fn bounds_are_respected() {
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(20);
        for _ in 0..100 {
            let d = wait_between(min, max).unwrap();
            assert!(d >= min && d < max);
        }
    }
}
