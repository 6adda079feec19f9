//! Retry orchestration
//!
//! Drives one job from "no result" to "parsed report or definitive failure".
//! This is the only place that decides retry vs. abort: the wire client and
//! report fetcher raise typed errors, and the orchestrator dispatches on
//! their [`ErrorKind`] under a capped exponential backoff. Progress is
//! emitted on the shared `EventBus`; the external job runner subscribes and
//! owns all persistence and notification.

use crate::config::MossConfig;
use crate::error::{ErrorKind, MossError};
use crate::retry::RetrySchedule;
use crate::services::pinger::{LatencyMonitor, LoadStatus};
use crate::services::report_fetcher::ReportFetcher;
use crate::services::wire_client::{is_valid_moss_url, MossSession};
use crate::types::{JobOptions, MossReport, SubmissionFile};
use chrono::Utc;
use moss_common::events::{EventBus, MossEvent};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Client for the similarity service, owning the retry policy
pub struct MossClient {
    user_id: String,
    config: MossConfig,
    schedule: RetrySchedule,
    fetcher: ReportFetcher,
    monitor: Arc<LatencyMonitor>,
    events: EventBus,
}

impl MossClient {
    pub fn new(
        user_id: impl Into<String>,
        config: MossConfig,
        monitor: Arc<LatencyMonitor>,
        events: EventBus,
    ) -> Result<Self, MossError> {
        let fetcher = ReportFetcher::new(&config)?;
        let schedule = RetrySchedule::new(config.retry.clone());
        Ok(Self {
            user_id: user_id.into(),
            config,
            schedule,
            fetcher,
            monitor,
            events,
        })
    }

    /// Generate a report for one job: submit the files, fetch the result,
    /// retrying recoverable failures until the budget runs out.
    ///
    /// `files` are compared pairwise; `base_files` only suppress boilerplate
    /// matches. Cancellation aborts backoff sleeps as well as in-flight
    /// attempts between stages.
    pub async fn generate(
        &self,
        options: &JobOptions,
        files: &[SubmissionFile],
        base_files: &[SubmissionFile],
        cancel: &CancellationToken,
    ) -> Result<MossReport, MossError> {
        options.validate()?;
        if files.is_empty() {
            return Err(MossError::NoFiles);
        }

        let job_id = Uuid::new_v4();
        let started = Instant::now();
        let budget = self.schedule.budget();
        let mut attempt: u32 = 0;
        let mut held_url: Option<String> = None;
        let mut last_error: Option<MossError> = None;

        loop {
            let delay = self.schedule.delay_for(attempt);
            if !delay.is_zero() {
                self.events.emit_lossy(MossEvent::RetryScheduled {
                    job_id,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: last_error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                    timestamp: Utc::now(),
                });
                tokio::select! {
                    _ = cancel.cancelled() => return Err(MossError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(MossError::Cancelled);
            }

            let error = match self
                .run_attempt(job_id, options, files, base_files, &mut held_url)
                .await
            {
                Ok(report) => {
                    tracing::info!(
                        job_id = %job_id,
                        attempt,
                        matches = report.matches.len(),
                        skipped = report.skipped_matches.len(),
                        "Report generated"
                    );
                    return Ok(report);
                }
                Err(error) => error,
            };
            tracing::warn!(job_id = %job_id, attempt, error = %error, "Attempt failed");

            match &error {
                // A broken index means the URL itself went bad; regenerate it
                MossError::ReportParsing(_) => held_url = None,

                // Empty responses are ambiguous: overload means wait longer,
                // but a quiet service that still answers nothing will never
                // answer at all.
                MossError::EmptyResponse => {
                    let load = self.monitor.determine_load(false).await;
                    tracing::info!(job_id = %job_id, load = ?load, "Empty response, consulted latency monitor");
                    if load == LoadStatus::Normal && attempt + 1 >= self.schedule.min_retries() {
                        return Err(MossError::ServiceNotResponding {
                            attempts: attempt + 1,
                        });
                    }
                }

                _ if error.kind() == ErrorKind::Fatal => return Err(error),

                // Remaining recoverable errors retry with the held URL intact
                _ => {}
            }

            attempt += 1;
            if started.elapsed() >= budget {
                return Err(MossError::ProcessingTimeExceeded {
                    last: Box::new(error),
                });
            }
            last_error = Some(error);
        }
    }

    /// One attempt: ensure a result URL is held, then fetch the report
    async fn run_attempt(
        &self,
        job_id: Uuid,
        options: &JobOptions,
        files: &[SubmissionFile],
        base_files: &[SubmissionFile],
        held_url: &mut Option<String>,
    ) -> Result<MossReport, MossError> {
        // Re-validate a held URL before reuse; a stale or tampered value
        // forces regeneration rather than a fetch against the wrong host.
        let url = match held_url
            .as_ref()
            .filter(|u| is_valid_moss_url(u, &self.config.server_host))
        {
            Some(url) => url.clone(),
            None => {
                let url = self
                    .generate_url(job_id, options, files, base_files)
                    .await?;
                *held_url = Some(url.clone());
                url
            }
        };

        let report = self.fetcher.fetch(&url).await?;
        for &index in &report.skipped_matches {
            self.events.emit_lossy(MossEvent::MatchSkipped {
                job_id,
                index,
                timestamp: Utc::now(),
            });
        }
        Ok(report)
    }

    /// Full protocol cycle on a fresh session: connect, configure, upload,
    /// finalize. The session is closed best-effort on every path so close
    /// failures never mask the primary error.
    async fn generate_url(
        &self,
        job_id: Uuid,
        options: &JobOptions,
        files: &[SubmissionFile],
        base_files: &[SubmissionFile],
    ) -> Result<String, MossError> {
        let mut session = MossSession::connect(&self.config, &self.user_id).await?;
        let result = self
            .drive_session(&mut session, job_id, options, files, base_files)
            .await;
        session.close().await;
        result
    }

    async fn drive_session(
        &self,
        session: &mut MossSession,
        job_id: Uuid,
        options: &JobOptions,
        files: &[SubmissionFile],
        base_files: &[SubmissionFile],
    ) -> Result<String, MossError> {
        session.configure(options).await?;

        self.events.emit_lossy(MossEvent::UploadStarted {
            job_id,
            file_count: files.len(),
            timestamp: Utc::now(),
        });
        for file in base_files {
            session.upload_file(file, 0, options.use_basename).await?;
        }
        for (index, file) in files.iter().enumerate() {
            session
                .upload_file(file, index as u32 + 1, options.use_basename)
                .await?;
        }
        self.events.emit_lossy(MossEvent::UploadFinished {
            job_id,
            timestamp: Utc::now(),
        });

        self.events.emit_lossy(MossEvent::ProcessingStarted {
            job_id,
            timestamp: Utc::now(),
        });
        let url = session.finalize(&options.comment).await?;
        self.events.emit_lossy(MossEvent::ProcessingFinished {
            job_id,
            report_url: url.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!(job_id = %job_id, url = %url, "Obtained result URL");
        Ok(url)
    }
}
