//! The gRPC transport that exposes [`Worker`](super::handler::Worker) on the
//! network: TCP listener, optional TLS, optional bearer-secret auth, and an
//! always-installed request validator.

use std::net::SocketAddr;

use thiserror::Error;
use tonic::{
    transport::{Identity, Server, ServerTlsConfig},
    Request, Status,
};

use crate::proto::{worker_server::WorkerServer, RunRequest};

use super::handler::Worker;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("worker server is already serving")]
    AlreadyServing,
    #[error("failed to bind listen address: {0}")]
    Bind(#[source] std::io::Error),
    #[error("invalid tls identity: {0}")]
    Tls(#[source] tonic::transport::Error),
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Lifecycle of a [`WorkerGrpcServer`]: mirrors the original's implicit
/// `grpc.Server` state machine with an explicit enum so a double `serve` or
/// a `stop` before `serve` is a programming error rather than a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerServerState {
    New,
    Serving,
    Stopped,
}

/// TLS material for the server's listen socket.
pub struct TlsConfig {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

pub struct WorkerGrpcServer {
    addr: SocketAddr,
    secret: Option<String>,
    tls: Option<TlsConfig>,
    state: WorkerServerState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl WorkerGrpcServer {
    pub fn new(addr: SocketAddr, secret: Option<String>, tls: Option<TlsConfig>) -> Self {
        Self {
            addr,
            secret,
            tls,
            state: WorkerServerState::New,
            shutdown_tx: None,
        }
    }

    pub fn state(&self) -> WorkerServerState {
        self.state
    }

    /// Binds and serves until [`stop`](Self::stop) is called. Borrows
    /// mutably rather than consuming `self` so a caller holding a `&mut`
    /// reference elsewhere (e.g. a signal-handling task) can still call
    /// `stop` while this future is being polled.
    pub async fn serve(&mut self) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(ServerError::Bind)?;
        self.serve_on(listener).await
    }

    /// Same as [`serve`](Self::serve), but serves a pre-bound listener.
    /// Used by tests that bind to an ephemeral port and need to know which
    /// one was chosen before connecting.
    pub async fn serve_on(&mut self, listener: tokio::net::TcpListener) -> Result<(), ServerError> {
        if self.state != WorkerServerState::New {
            return Err(ServerError::AlreadyServing);
        }

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.state = WorkerServerState::Serving;

        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;
        tracing::info!(component = "worker_server", addr = %local_addr, "starting worker server");

        let mut builder = Server::builder();
        if let Some(tls) = &self.tls {
            let identity = Identity::from_pem(&tls.cert_pem, &tls.key_pem);
            builder = builder
                .tls_config(ServerTlsConfig::new().identity(identity))
                .map_err(ServerError::Tls)?;
        }

        let secret = self.secret.clone();
        let worker_service = WorkerServer::with_interceptor(Worker::new(), move |req| {
            validate_request(req, secret.as_deref())
        });

        builder
            .add_service(worker_service)
            .serve_with_incoming_shutdown(
                tokio_stream::wrappers::TcpListenerStream::new(listener),
                async {
                    let _ = shutdown_rx.await;
                },
            )
            .await?;

        tracing::info!(component = "worker_server", "worker server stopped");
        Ok(())
    }

    /// Signals a running server to stop. Idempotent: a second call on an
    /// already-stopped server is a no-op, matching `grpc.Server.Stop`'s own
    /// idempotency.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.state = WorkerServerState::Stopped;
    }
}

/// Single interceptor doing both jobs the original split across two gRPC
/// middlewares: bearer-secret auth (when a secret is configured) and
/// structural validation of the `RunRequest` (always installed).
fn validate_request(mut req: Request<()>, secret: Option<&str>) -> Result<Request<()>, Status> {
    if let Some(secret) = secret {
        let token = req
            .metadata()
            .get("authorization")
            .ok_or_else(|| Status::unauthenticated("missing authorization metadata"))?
            .to_str()
            .map_err(|_| Status::unauthenticated("invalid authorization metadata"))?;

        let token = token.strip_prefix("basic ").unwrap_or(token);
        if token != secret {
            return Err(Status::permission_denied("wrong auth secret"));
        }
    }

    req.extensions_mut().insert(Validated);
    Ok(req)
}

/// Marker inserted once auth has run, so handlers never need to re-check it.
#[derive(Clone, Copy)]
struct Validated;

/// Structural checks on a decoded `RunRequest`, run by the handler itself
/// since `tonic`'s interceptor hook only sees the un-decoded request on
/// streaming RPCs. Exposed so [`super::handler`] can call it before
/// dispatching to the load-test service.
pub fn validate_run_request(req: &RunRequest) -> Result<(), Status> {
    if req.min_wait_time > req.max_wait_time {
        return Err(Status::aborted(
            "max wait duration is bigger than min wait duration",
        ));
    }
    if req.amount > 0 && req.endpoints.is_empty() {
        return Err(Status::invalid_argument(
            "amount is greater than zero but no endpoints were given",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_request_rejects_missing_secret_header() {
        let req = Request::new(());
        let err = validate_request(req, Some("topsecret")).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn validate_request_accepts_matching_secret() {
        let mut req = Request::new(());
        req.metadata_mut()
            .insert("authorization", "basic topsecret".parse().unwrap());
        assert!(validate_request(req, Some("topsecret")).is_ok());
    }

    #[test]
    fn validate_request_rejects_wrong_secret() {
        let mut req = Request::new(());
        req.metadata_mut()
            .insert("authorization", "basic wrong".parse().unwrap());
        let err = validate_request(req, Some("topsecret")).unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn validate_request_without_secret_configured_allows_anything() {
        let req = Request::new(());
        assert!(validate_request(req, None).is_ok());
    }

    #[test]
    fn validate_run_request_rejects_inverted_wait_bounds() {
        let req = RunRequest {
            endpoints: vec![],
            amount: 0,
            min_wait_time: 200,
            max_wait_time: 100,
            r#type: 0,
        };
        let err = validate_run_request(&req).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Aborted);
        assert!(err.message().contains("max wait duration is bigger"));
    }

    #[test]
    fn validate_run_request_rejects_empty_endpoints_with_nonzero_amount() {
        let req = RunRequest {
            endpoints: vec![],
            amount: 5,
            min_wait_time: 1,
            max_wait_time: 1,
            r#type: 0,
        };
        let err = validate_run_request(&req).unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
