//! Service modules for the submission pipeline

pub mod match_parser;
pub mod orchestrator;
pub mod pinger;
pub mod report_fetcher;
pub mod wire_client;

pub use match_parser::parse_match;
pub use orchestrator::MossClient;
pub use pinger::{InMemoryLatencyStore, LatencyMonitor, LatencyStore, LoadStatus, PingScalar};
pub use report_fetcher::ReportFetcher;
pub use wire_client::{is_valid_moss_url, MossSession};
