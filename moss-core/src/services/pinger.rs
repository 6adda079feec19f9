//! Service latency monitoring
//!
//! A background task pings the service on its own schedule and maintains two
//! smoothed latency scalars in a shared store: `latest` (fast-moving, reacts
//! quickly to spikes) and `average` (the long-run baseline). The retry
//! orchestrator reads the derived load classification for exactly one
//! purpose: deciding whether an empty response means "overloaded, keep
//! waiting" or "idle yet silent, give up".
//!
//! The heuristic is approximate by nature; ping latency and processing queue
//! depth are different signals. Consumers should treat the classification as
//! ordering information, not a calibrated measurement.

use crate::config::{MossConfig, PingParams};
use crate::error::MossError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = "moss-core/0.1.0";

/// Coarse classification of service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatus {
    Normal,
    UnderLoad,
    UnderSevereLoad,
    Down,
}

/// The two persisted latency scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PingScalar {
    /// Fast-moving smoothed latency, cleared when the service stops answering
    Latest,
    /// Long-run baseline, survives outages
    Average,
}

/// Shared storage for the latency scalars
///
/// The monitor is process-wide but the deployment may not be: multiple
/// workers share one view of service health through whatever implements this
/// trait. The in-memory implementation below serves a single process; a
/// multi-process deployment backs the same two scalars with an external
/// store. Reads and writes are atomic per scalar; no cross-scalar
/// transaction is required.
pub trait LatencyStore: Send + Sync {
    fn get(&self, scalar: PingScalar) -> anyhow::Result<Option<f64>>;
    fn set(&self, scalar: PingScalar, value: Option<f64>) -> anyhow::Result<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryLatencyStore {
    latest: RwLock<Option<f64>>,
    average: RwLock<Option<f64>>,
}

impl InMemoryLatencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, scalar: PingScalar) -> &RwLock<Option<f64>> {
        match scalar {
            PingScalar::Latest => &self.latest,
            PingScalar::Average => &self.average,
        }
    }
}

impl LatencyStore for InMemoryLatencyStore {
    fn get(&self, scalar: PingScalar) -> anyhow::Result<Option<f64>> {
        Ok(*self
            .slot(scalar)
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn set(&self, scalar: PingScalar, value: Option<f64>) -> anyhow::Result<()> {
        *self
            .slot(scalar)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
        Ok(())
    }
}

/// Latency monitor over a shared store
pub struct LatencyMonitor {
    http: reqwest::Client,
    ping_url: String,
    params: PingParams,
    store: Arc<dyn LatencyStore>,
}

impl LatencyMonitor {
    pub fn new(config: &MossConfig, store: Arc<dyn LatencyStore>) -> Result<Self, MossError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.ping.timeout_secs))
            .build()
            .map_err(|e| MossError::Connection(format!("ping client construction failed: {e}")))?;

        Ok(Self {
            http,
            ping_url: format!("http://{}/", config.server_host),
            params: config.ping.clone(),
            store,
        })
    }

    /// Record one successful latency sample
    ///
    /// The first sample calibrates both scalars. Afterwards each scalar moves
    /// by its EMA: `alpha * sample + (1 - alpha) * current`, with the alpha
    /// chosen by whether the sample is worse (higher) than the current value.
    pub fn observe(&self, sample_ms: f64) {
        let latest = match self.read(PingScalar::Latest) {
            None => sample_ms,
            Some(current) => {
                let alpha = if sample_ms > current {
                    self.params.latest_worse_alpha
                } else {
                    self.params.latest_better_alpha
                };
                alpha * sample_ms + (1.0 - alpha) * current
            }
        };
        self.write(PingScalar::Latest, Some(latest));

        let average = match self.read(PingScalar::Average) {
            None => sample_ms,
            Some(current) => {
                let alpha = if sample_ms > current {
                    self.params.average_worse_alpha
                } else {
                    self.params.average_better_alpha
                };
                alpha * sample_ms + (1.0 - alpha) * current
            }
        };
        self.write(PingScalar::Average, Some(average));

        tracing::debug!(sample_ms, latest, average, "Updated ping state");
    }

    /// Record a failed ping: the service is presumed down, so `latest` is
    /// cleared to unknown. The baseline is left untouched so recovery is
    /// judged against pre-outage behavior.
    pub fn observe_failure(&self) {
        self.write(PingScalar::Latest, None);
    }

    /// Ping the service once and fold the result into the shared state
    pub async fn ping(&self) -> Option<f64> {
        let start = Instant::now();
        match self.http.head(&self.ping_url).send().await {
            Ok(_) => {
                // Any answer proves the host is up; status is irrelevant
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                self.observe(elapsed_ms);
                Some(elapsed_ms)
            }
            Err(e) => {
                tracing::debug!(url = %self.ping_url, error = %e, "Ping failed");
                self.observe_failure();
                None
            }
        }
    }

    /// Classify current load from the stored scalars
    pub fn classify(&self) -> LoadStatus {
        let Some(latest) = self.read(PingScalar::Latest) else {
            return LoadStatus::Down;
        };
        let Some(average) = self.read(PingScalar::Average) else {
            // Not yet calibrated; assume the best so a cold system does not
            // block legitimate retries
            return LoadStatus::Normal;
        };

        let threshold = self.params.offset_threshold_ms;
        if latest <= average + threshold {
            LoadStatus::Normal
        } else if latest <= average + 2.0 * threshold {
            LoadStatus::UnderLoad
        } else {
            LoadStatus::UnderSevereLoad
        }
    }

    /// Classify, optionally re-pinging first
    pub async fn determine_load(&self, refresh: bool) -> LoadStatus {
        if refresh {
            self.ping().await;
        }
        self.classify()
    }

    /// Background monitoring loop, decoupled from any one job's retries
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let interval = Duration::from_secs(self.params.interval_secs.max(1));
        tracing::info!(url = %self.ping_url, interval_secs = interval.as_secs(), "Latency monitor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Latency monitor stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.ping().await;
                }
            }
        }
    }

    fn read(&self, scalar: PingScalar) -> Option<f64> {
        match self.store.get(scalar) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(scalar = ?scalar, error = %e, "Latency store read failed");
                None
            }
        }
    }

    fn write(&self, scalar: PingScalar, value: Option<f64>) {
        if let Err(e) = self.store.set(scalar, value) {
            tracing::warn!(scalar = ?scalar, error = %e, "Latency store write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_monitor() -> (LatencyMonitor, Arc<InMemoryLatencyStore>) {
        let store = Arc::new(InMemoryLatencyStore::new());
        let monitor = LatencyMonitor::new(&MossConfig::default(), store.clone()).unwrap();
        (monitor, store)
    }

    #[test]
    fn test_cold_state_reads_down() {
        let (monitor, _store) = test_monitor();
        assert_eq!(monitor.classify(), LoadStatus::Down);
    }

    #[test]
    fn test_first_sample_calibrates_both_scalars() {
        let (monitor, store) = test_monitor();
        monitor.observe(10.0);
        assert_eq!(store.get(PingScalar::Latest).unwrap(), Some(10.0));
        assert_eq!(store.get(PingScalar::Average).unwrap(), Some(10.0));
        assert_eq!(monitor.classify(), LoadStatus::Normal);
    }

    #[test]
    fn test_spike_noticed_then_decays() {
        let (monitor, _store) = test_monitor();

        // Steady baseline
        for _ in 0..4 {
            monitor.observe(10.0);
            assert_eq!(monitor.classify(), LoadStatus::Normal);
        }

        // One large spike: latest jumps, baseline barely moves
        monitor.observe(200.0);
        assert_ne!(monitor.classify(), LoadStatus::Normal);
        assert_ne!(monitor.classify(), LoadStatus::Down);

        // Returning samples decay latest back toward the baseline. The exact
        // step count depends on the alphas; only the ordering is asserted.
        let mut statuses = Vec::new();
        for _ in 0..10 {
            monitor.observe(10.0);
            statuses.push(monitor.classify());
        }
        assert_eq!(*statuses.last().unwrap(), LoadStatus::Normal);
        // Once Normal, it stays Normal for the remaining samples
        let first_normal = statuses
            .iter()
            .position(|s| *s == LoadStatus::Normal)
            .expect("latest should decay back to baseline");
        assert!(statuses[first_normal..]
            .iter()
            .all(|s| *s == LoadStatus::Normal));
    }

    #[test]
    fn test_sustained_load_is_severe() {
        let (monitor, _store) = test_monitor();
        monitor.observe(10.0);
        for _ in 0..5 {
            monitor.observe(500.0);
        }
        assert_eq!(monitor.classify(), LoadStatus::UnderSevereLoad);
    }

    #[test]
    fn test_failure_clears_latest_only() {
        let (monitor, store) = test_monitor();
        monitor.observe(10.0);
        monitor.observe_failure();

        assert_eq!(store.get(PingScalar::Latest).unwrap(), None);
        assert_eq!(store.get(PingScalar::Average).unwrap(), Some(10.0));
        assert_eq!(monitor.classify(), LoadStatus::Down);
    }

    #[test]
    fn test_recovery_after_failure_judged_against_old_baseline() {
        let (monitor, _store) = test_monitor();
        monitor.observe(10.0);
        monitor.observe_failure();
        monitor.observe(12.0);
        // latest re-seeds at the new sample; baseline was kept at ~10
        assert_eq!(monitor.classify(), LoadStatus::Normal);
    }

    #[test]
    fn test_partial_store_assumes_normal() {
        // An external store can expose latest without a baseline; uncalibrated
        // baselines must not block retries.
        let (monitor, store) = test_monitor();
        store.set(PingScalar::Latest, Some(80.0)).unwrap();
        assert_eq!(monitor.classify(), LoadStatus::Normal);
    }
}
