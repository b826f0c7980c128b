//! loago - a distributed HTTP load-test driver.
//!
//! A worker process drives concurrent virtual users against a weighted set
//! of endpoints, using either a real Chromium-based browser or a synthetic
//! fake client, and streams per-request measurements back to an instructor
//! process, which persists them.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod instructor;
pub mod runner;
pub mod schedule;
pub mod service;
pub mod tracing_setup;
pub mod worker;

/// Generated gRPC types and service traits for the worker↔instructor
/// streaming protocol, compiled from `proto/worker.proto`.
pub mod proto {
    tonic::include_proto!("loago.worker");
}
