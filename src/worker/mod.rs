//! The worker side of loago: a gRPC service that runs load-test schedules on
//! request and streams results back as they complete.

pub mod handler;
pub mod server;

pub use handler::Worker;
pub use server::{ServerError, TlsConfig, WorkerGrpcServer, WorkerServerState};
