//! # MOSS protocol core
//!
//! Client for the MOSS similarity-detection service:
//! - Wire protocol client (line-oriented TCP submission protocol)
//! - Report fetcher and match HTML parser
//! - Latency monitor (smoothed ping state, load classification)
//! - Retry orchestrator (capped exponential backoff)
//!
//! The surrounding system (job bookkeeping, persistence, notification) calls
//! [`MossClient::generate`] with the job's options and files and observes
//! progress on the shared `EventBus`.

pub mod config;
pub mod error;
pub mod retry;
pub mod services;
pub mod types;

pub use config::{MossConfig, PingParams, RetryParams};
pub use error::{ErrorKind, MossError};
pub use services::orchestrator::MossClient;
pub use services::pinger::{InMemoryLatencyStore, LatencyMonitor, LatencyStore, LoadStatus};
pub use services::report_fetcher::ReportFetcher;
pub use services::wire_client::MossSession;
pub use types::{JobOptions, LinePair, LineRange, MatchRecord, MossReport, SubmissionFile};
