//! Bulk-export client for a helpdesk REST API.
//!
//! The engine walks rate-limited, cursor-paginated endpoints and streams
//! every record of a resource to a caller-supplied [`ItemConsumer`], with a
//! bounded per-page fan-out and cooperative early termination.

pub mod cli;
pub mod config;
pub mod export;
pub mod http;
pub mod pages;
pub mod pool;
pub mod rate;
pub mod resources;
pub mod validate;

pub use export::{ExportClient, ExportError, ExportLimits, ExportOutcome};
pub use pool::{ConsumerSignal, ItemConsumer, RunOutcome};
