use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{CallResult, RunnerError};

/// A [`FakeRunner`] performs no real network I/O: it waits roughly 50ms and
/// reports a canned `200 OK`. Used for self-test and load-generator
/// validation (S1, S2 in spec §8).
pub struct FakeRunner {
    pub id: usize,
    cancel: CancellationToken,
}

impl FakeRunner {
    pub fn new(id: usize, cancel: CancellationToken) -> Self {
        Self { id, cancel }
    }

    pub async fn call(&mut self, url: &str) -> Result<CallResult, RunnerError> {
        tracing::debug!(component = "runner", id = self.id, url, "call url");

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => Ok(CallResult {
                ttfb: Duration::from_millis(50),
                http_status_code: 200,
                http_status_message: "OK".to_string(),
                cached: false,
            }),
            _ = self.cancel.cancelled() => Err(RunnerError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_canned_ok_response() {
        let mut r = FakeRunner::new(0, CancellationToken::new());
        let res = r.call("http://a").await.unwrap();
        assert_eq!(res.http_status_code, 200);
        assert_eq!(res.http_status_message, "OK");
        assert_eq!(res.ttfb, Duration::from_millis(50));
        assert!(!res.cached);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_the_wait() {
        let cancel = CancellationToken::new();
        let mut r = FakeRunner::new(0, cancel.clone());
        cancel.cancel();
        let err = r.call("http://a").await.unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
    }
}
