//! Translates RPC requests into load-test service parameters and streams
//! results back on the gRPC stream.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::{
    proto::{self, worker_server::Worker as WorkerService},
    schedule::EndpointResult,
    service::{self, BrowserType, Endpoint, ServiceError},
    worker::server::validate_run_request,
};

/// Size of the internal results channel between the load-test service and
/// the stream forwarder.
pub const RESULT_BUFFER_SIZE: usize = 1000;

/// Implements the `loago.worker.Worker` gRPC service.
#[derive(Default)]
pub struct Worker;

impl Worker {
    pub fn new() -> Self {
        Self
    }
}

fn to_service_params(
    req: &proto::RunRequest,
) -> Result<(Duration, Duration, u32, BrowserType, Vec<Endpoint>), Status> {
    let min_wait = Duration::from_millis(req.min_wait_time as u64);
    let max_wait = Duration::from_millis(req.max_wait_time as u64);

    let browser_type = match proto::BrowserType::from_i32(req.r#type) {
        Some(proto::BrowserType::Fake) => BrowserType::Fake,
        Some(proto::BrowserType::Chrome) => BrowserType::Chrome,
        None => return Err(Status::invalid_argument("unknown browser type in request")),
    };

    let endpoints = req
        .endpoints
        .iter()
        .map(|e| Endpoint {
            url: e.url.clone(),
            weight: e.weight,
        })
        .collect();

    Ok((min_wait, max_wait, req.amount, browser_type, endpoints))
}

fn to_wire_result(res: &EndpointResult) -> proto::EndpointResult {
    proto::EndpointResult {
        url: res.url.clone(),
        http_status_code: res.http_status_code,
        http_status_message: res.http_status_message.clone(),
        ttfb: res.ttfb.as_millis() as i32,
        cached: res.cached,
    }
}

#[tonic::async_trait]
impl WorkerService for Worker {
    async fn ping(
        &self,
        request: Request<proto::PingRequest>,
    ) -> Result<Response<proto::PingResponse>, Status> {
        let peer = request
            .remote_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!(component = "worker_handler", source_ip = %peer, "incoming ping request");

        Ok(Response::new(proto::PingResponse {
            message: "pong".to_string(),
        }))
    }

    type RunStream = ReceiverStream<Result<proto::EndpointResult, Status>>;

    async fn run(
        &self,
        request: Request<proto::RunRequest>,
    ) -> Result<Response<Self::RunStream>, Status> {
        validate_run_request(request.get_ref())?;
        let (min_wait, max_wait, amount, browser_type, endpoints) =
            to_service_params(request.get_ref())?;

        let cancel = CancellationToken::new();
        let (result_tx, mut result_rx) = mpsc::channel(RESULT_BUFFER_SIZE);
        let (stream_tx, stream_rx) = mpsc::channel(RESULT_BUFFER_SIZE);

        let service_cancel = cancel.clone();
        let service_task = tokio::spawn(async move {
            service::run(
                service_cancel,
                browser_type,
                endpoints,
                min_wait,
                max_wait,
                amount,
                result_tx,
            )
            .await
        });

        let forward_cancel = cancel.clone();
        tokio::spawn(async move {
            // Forward every result as it arrives. The channel closes (recv
            // returns None) once the service has joined every schedule and
            // dropped its sender: normal end of stream.
            while let Some(r) = result_rx.recv().await {
                if stream_tx.send(Ok(to_wire_result(&r))).await.is_err() {
                    tracing::info!(component = "worker_handler", "instructor closed connection");
                    forward_cancel.cancel();
                    return;
                }
            }

            match service_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = stream_tx.send(Err(status_for_service_error(&e))).await;
                }
                Err(join_err) => {
                    let _ = stream_tx.send(Err(Status::unknown(join_err.to_string()))).await;
                }
            }
            forward_cancel.cancel();
        });

        Ok(Response::new(ReceiverStream::new(stream_rx)))
    }
}

fn status_for_service_error(e: &ServiceError) -> Status {
    match e {
        ServiceError::AllWeightsZero => Status::invalid_argument(e.to_string()),
        _ => Status::aborted(e.to_string()),
    }
}
