//! Application layer for the dispatch system.
//!
//! Wires the job queue, worker pool and topic hub to SurrealDB and the
//! export sink, and exposes the network operations an HTTP layer would call:
//! - Network CRUD with a count broadcast after create and update
//! - Fire-and-forget export of the first network
//! - SSE-ready subscriptions to hub topics

mod config;
mod error;
mod export;
mod init;
mod networks;
pub mod realtime;
mod telemetry;

pub use config::{AppConfig, DEFAULT_DELIVERY_TIMEOUT_MS};
pub use error::AppError;
pub use export::{export_line, ExportHandler, ExportPayload, EXPORT_JOB_TYPE, EXPORT_KEY};
pub use init::{bootstrap, App};
pub use networks::{CountSummary, NetworkService, COUNT_TOPIC, PER_PAGE};
pub use telemetry::init_tracing;
