//! Drives one load test from connection through completion: connects every
//! worker, starts the run, stores results as they arrive, and stops early on
//! SIGINT/SIGTERM.

use std::time::Duration;

use thiserror::Error;

use crate::{
    backend::{BackendError, DataBackend, StoredResult},
    proto::BrowserType,
    service::Endpoint,
};

use super::client::{Client, ClientError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("cannot connect to all workers: {0}")]
    Connect(#[source] ClientError),
    #[error("cannot store result: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Connects every worker configured on `client`, runs a load test across all
/// of them, and stores every result through `backend` until either every
/// worker's stream ends naturally or the process receives SIGINT/SIGTERM.
pub async fn run_to_completion(
    client: &mut Client,
    endpoints: Vec<Endpoint>,
    amount: u32,
    min_wait: Duration,
    max_wait: Duration,
    backend: &mut dyn DataBackend,
) -> Result<(), ControllerError> {
    tracing::info!(component = "run_controller", "connecting to workers");
    client
        .connect(CONNECT_TIMEOUT)
        .await
        .map_err(ControllerError::Connect)?;
    tracing::info!(component = "run_controller", "connections established");

    let mut results = client
        .run(endpoints, amount, min_wait, max_wait, BrowserType::Chrome)
        .await;

    let mut sigterm = install_sigterm()?;

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                tracing::info!(component = "run_controller", "received sigint, stopping requests to workers");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!(component = "run_controller", "received sigterm, stopping requests to workers");
                break;
            }
            maybe = results.recv() => {
                match maybe {
                    Some(Ok(result)) => {
                        if let Err(e) = store(backend, result) {
                            tracing::error!(component = "run_controller", error = %e, "could not store result");
                        }
                    }
                    Some(Err(e)) => tracing::error!(component = "run_controller", error = %e, "worker reported an error"),
                    None => {
                        tracing::info!(component = "run_controller", "all workers finished");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(component = "run_controller", "disconnecting from workers");
    client.disconnect();
    backend.close()?;

    Ok(())
}

fn store(backend: &mut dyn DataBackend, result: StoredResult) -> Result<(), ControllerError> {
    tracing::info!(
        component = "run_controller",
        url = %result.url,
        status = result.http_status_code,
        "received result"
    );
    backend.store(&result)?;
    Ok(())
}

#[cfg(unix)]
fn install_sigterm() -> Result<tokio::signal::unix::Signal, ControllerError> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(ControllerError::Signal)
}

#[cfg(not(unix))]
fn install_sigterm() -> Result<NeverFires, ControllerError> {
    Ok(NeverFires)
}

#[cfg(not(unix))]
struct NeverFires;

#[cfg(not(unix))]
impl NeverFires {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
