//! Long-running sync daemon: a Unix socket front end over a per-document
//! single-flight scheduler.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
pub use scheduler::{DocumentScheduler, SchedulerStats, SharedGateway, SyncJob};
