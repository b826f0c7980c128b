//! The instructor side of loago: configuration, the fan-out gRPC client,
//! and the run controller that drives a load test to completion.

pub mod client;
pub mod config;
pub mod controller;

pub use client::{Client, ClientError, WorkerDescriptor};
pub use config::{ConfigError, InstructorConfig};
pub use controller::{run_to_completion, ControllerError};
