//! Error taxonomy for the protocol core
//!
//! Every error carries an explicit [`ErrorKind`]: `Fatal` errors signal that
//! the request cannot succeed as-is and must never be retried; `Recoverable`
//! errors are candidates for the orchestrator's backoff loop. The
//! orchestrator is the only place that dispatches on the kind.

use thiserror::Error;

/// Retry classification of a [`MossError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself cannot succeed; retrying unmodified is pointless
    Fatal,
    /// Transient condition; retry with backoff may succeed
    Recoverable,
}

/// Errors raised by the protocol client, report fetcher, and orchestrator
#[derive(Debug, Error)]
pub enum MossError {
    /// Language is not in the supported set (checked locally and re-checked
    /// against the service's acknowledgement)
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// No comparison files were supplied or accepted
    #[error("No files uploaded to compare")]
    NoFiles,

    /// A numeric option was rejected locally before any socket write
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The request was malformed from the service's point of view, or an
    /// operation was invoked out of session order
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unrecognized or malformed protocol response, raw text attached
    #[error("Malformed protocol response: {0}")]
    Protocol(String),

    /// Result URL does not resolve to the expected service host
    #[error("Invalid report URL: {0}")]
    InvalidReportUrl(String),

    /// The service repeatedly returned nothing while its measured load was
    /// normal; the job will never finish as configured
    #[error("Service is responsive but produced no result after {attempts} attempts")]
    ServiceNotResponding { attempts: u32 },

    /// The job was cancelled while waiting or mid-flight
    #[error("Job cancelled")]
    Cancelled,

    /// The retry budget ran out before a result was obtained
    #[error("Maximum processing time exceeded (last error: {last})")]
    ProcessingTimeExceeded { last: Box<MossError> },

    /// TCP or HTTP transport failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service closed the session or answered with an empty line;
    /// the retry controller disambiguates via the latency monitor
    #[error("Empty response from service")]
    EmptyResponse,

    /// A match page could not be downloaded within its own retry allowance
    #[error("Report download timed out: {0}")]
    ReportDownloadTimeout(String),

    /// The report index was missing or structurally unusable; the held
    /// result URL must be regenerated
    #[error("Report parsing failed: {0}")]
    ReportParsing(String),

    /// One match fragment was structurally unparseable
    #[error("Unparseable match: {0}")]
    UnparseableMatch(String),

    /// Configuration error from the common layer
    #[error("Configuration error: {0}")]
    Config(#[from] moss_common::Error),
}

impl MossError {
    /// Retry classification, dispatched exhaustively by the orchestrator
    pub fn kind(&self) -> ErrorKind {
        match self {
            MossError::UnsupportedLanguage(_)
            | MossError::NoFiles
            | MossError::InvalidParameter(_)
            | MossError::InvalidRequest(_)
            | MossError::Protocol(_)
            | MossError::InvalidReportUrl(_)
            | MossError::ServiceNotResponding { .. }
            | MossError::Cancelled
            | MossError::ProcessingTimeExceeded { .. }
            | MossError::Config(_) => ErrorKind::Fatal,

            MossError::Connection(_)
            | MossError::EmptyResponse
            | MossError::ReportDownloadTimeout(_)
            | MossError::ReportParsing(_)
            | MossError::UnparseableMatch(_) => ErrorKind::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Look up a known service error message
///
/// `msg` is the text after the `Error:` prefix of a response line. Unknown
/// messages fall through to [`MossError::Protocol`] at the call site so the
/// raw text is preserved for logging.
pub(crate) fn lookup_server_error(msg: &str) -> Option<MossError> {
    let lowered = msg.to_ascii_lowercase();
    if lowered.contains("no files uploaded to compare") {
        return Some(MossError::NoFiles);
    }
    None
}
