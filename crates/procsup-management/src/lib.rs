//! # procsup management
//!
//! The management channel between a supervisor and its worker.
//!
//! The worker exposes three operations over HTTP/1.1 on a local port:
//!
//! | Operation  | Request                         | Success                  |
//! |------------|---------------------------------|--------------------------|
//! | ping       | `GET /mgmt/<name>/ping`         | `200`                    |
//! | is_ready   | `GET /mgmt/<name>/ready`        | `200 {"ready": <bool>}`  |
//! | stop       | `POST /mgmt/<name>/stop`        | `200` or `202`           |
//!
//! [`RemoteHandle`] is the supervisor side; [`ManagementServer`] and
//! [`ManagedWorker`] are the worker side.

pub mod client;
pub mod protocol;
pub mod server;
pub mod worker_env;

pub use client::RemoteHandle;
pub use protocol::{ManagementEndpoint, ManagementOp, ReadyResponse, StopResponse};
pub use server::{ManagedWorker, ManagementServer};
pub use worker_env::WorkerEnvironment;
