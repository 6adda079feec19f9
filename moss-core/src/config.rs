//! Configuration loading for the protocol core
//!
//! All fields default to values suitable for the public service; a TOML file
//! can override any subset. Resolution priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `MOSS_CONFIG` environment variable
//! 3. `<config_dir>/moss/config.toml` if present
//! 4. Compiled defaults (fallback)

use moss_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Protocol core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MossConfig {
    /// Service host for both the submission socket and report retrieval
    pub server_host: String,
    /// Submission protocol TCP port
    pub server_port: u16,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-read timeout on the submission socket, in seconds. The service
    /// may take hours to answer the terminal query.
    pub session_read_timeout_secs: u64,
    /// Per-request timeout for report HTTP fetches, in seconds
    pub http_timeout_secs: u64,
    /// Accept invalid TLS certificates on report fetches. The service's
    /// result pages are served with a certificate that does not validate.
    pub http_accept_invalid_certs: bool,
    /// Concurrent match-page downloads per report
    pub fetch_concurrency: usize,
    /// Attempts per match page before the download counts as timed out
    pub fetch_retry_count: u32,
    pub retry: RetryParams,
    pub ping: PingParams,
}

impl Default for MossConfig {
    fn default() -> Self {
        Self {
            server_host: "moss.stanford.edu".to_string(),
            server_port: 7690,
            connect_timeout_secs: 30,
            session_read_timeout_secs: 2 * 60 * 60,
            http_timeout_secs: 30,
            http_accept_invalid_certs: true,
            fetch_concurrency: 8,
            fetch_retry_count: 5,
            retry: RetryParams::default(),
            ping: PingParams::default(),
        }
    }
}

impl MossConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn session_read_timeout(&self) -> Duration {
        Duration::from_secs(self.session_read_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Load configuration following the priority order above
    pub fn load(path: Option<&Path>) -> Result<MossConfig> {
        // Priority 1: explicit path
        if let Some(path) = path {
            return Self::from_file(path);
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var("MOSS_CONFIG") {
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: user config dir
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // Priority 4: compiled defaults
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<MossConfig> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("moss").join("config.toml"))
}

/// Backoff schedule parameters for the retry orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryParams {
    /// Smallest backoff sleep, in milliseconds
    pub min_sleep_ms: u64,
    /// Backoff cap, in milliseconds
    pub max_sleep_ms: u64,
    /// Exponential growth base
    pub growth_base: f64,
    /// Total retry budget per job, in seconds
    pub max_total_secs: u64,
    /// Run attempt 0 without sleeping first
    pub first_attempt_immediate: bool,
    /// Attempts to allow before an empty response under normal load is
    /// treated as fatal
    pub min_retries: u32,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            min_sleep_ms: 30_000,
            max_sleep_ms: 1_800_000,
            growth_base: 2.0,
            max_total_secs: 12 * 60 * 60,
            first_attempt_immediate: true,
            min_retries: 5,
        }
    }
}

/// Latency monitor parameters
///
/// The alphas are exponential-moving-average coefficients. `latest_*` govern
/// the fast-moving scalar (spikes noticed quickly, decay slower); `average_*`
/// govern the long-run baseline (near-permanent memory). Asymmetric by
/// direction: a worse (higher) sample uses the `worse` coefficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PingParams {
    /// Background ping interval, in seconds
    pub interval_secs: u64,
    /// Per-ping timeout, in seconds
    pub timeout_secs: u64,
    /// Milliseconds above the baseline before the service counts as loaded;
    /// twice this before it counts as severely loaded
    pub offset_threshold_ms: f64,
    pub latest_worse_alpha: f64,
    pub latest_better_alpha: f64,
    pub average_worse_alpha: f64,
    pub average_better_alpha: f64,
}

impl Default for PingParams {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 5,
            offset_threshold_ms: 30.0,
            latest_worse_alpha: 0.6,
            latest_better_alpha: 0.3,
            average_worse_alpha: 0.005,
            average_better_alpha: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_target_public_service() {
        let config = MossConfig::default();
        assert_eq!(config.server_host, "moss.stanford.edu");
        assert_eq!(config.server_port, 7690);
        assert!(config.session_read_timeout() >= Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_host = \"127.0.0.1\"").unwrap();
        writeln!(file, "[retry]").unwrap();
        writeln!(file, "min_retries = 3").unwrap();

        let config = MossConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.retry.min_retries, 3);
        // untouched fields keep their defaults
        assert_eq!(config.server_port, 7690);
        assert_eq!(config.retry.growth_base, 2.0);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_port = \"not a number\"").unwrap();

        match MossConfig::load(Some(file.path())) {
            Err(Error::Config(msg)) => assert!(msg.contains("server_port")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = MossConfig::load(Some(Path::new("/nonexistent/moss.toml")));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
