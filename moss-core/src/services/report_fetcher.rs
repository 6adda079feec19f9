//! Report retrieval
//!
//! Downloads a result's index page, fans out over the per-match fragments,
//! and parses each into a [`MatchRecord`]. Match pages are fetched
//! concurrently behind a bounded window; each page gets its own small retry
//! allowance, independent of the orchestrator's backoff.

use crate::config::MossConfig;
use crate::error::MossError;
use crate::services::match_parser::parse_match;
use crate::services::wire_client::is_valid_moss_url;
use crate::types::MossReport;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

const USER_AGENT: &str = "moss-core/0.1.0";

/// Marker the index page carries once per table row; one row is the header,
/// the rest are matches.
const MATCH_ROW_MARKER: &str = "<TR>";

pub struct ReportFetcher {
    http: reqwest::Client,
    expected_host: String,
    concurrency: usize,
    retry_count: u32,
}

impl ReportFetcher {
    pub fn new(config: &MossConfig) -> Result<Self, MossError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout())
            .danger_accept_invalid_certs(config.http_accept_invalid_certs)
            .build()
            .map_err(|e| MossError::Connection(format!("HTTP client construction failed: {e}")))?;

        Ok(Self {
            http,
            expected_host: config.server_host.clone(),
            concurrency: config.fetch_concurrency.max(1),
            retry_count: config.fetch_retry_count.max(1),
        })
    }

    /// Fetch and parse a full report from a validated result URL
    pub async fn fetch(&self, url: &str) -> Result<MossReport, MossError> {
        if !is_valid_moss_url(url, &self.expected_host) {
            return Err(MossError::InvalidReportUrl(url.to_string()));
        }
        let base = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };

        let index = self.fetch_index(&base).await?;
        let count = index.matches(MATCH_ROW_MARKER).count().saturating_sub(1);
        tracing::info!(url = %base, matches = count, "Fetched report index");

        let pages = self.fetch_match_pages(&base, count).await?;

        let mut matches = Vec::with_capacity(count);
        let mut skipped_matches = Vec::new();
        for (match_index, html) in pages {
            match parse_match(&html) {
                Ok(record) => matches.push(record),
                Err(e) => {
                    tracing::warn!(url = %base, match_index, error = %e, "Skipping unparseable match");
                    skipped_matches.push(match_index);
                }
            }
        }

        Ok(MossReport {
            url: base,
            matches,
            skipped_matches,
        })
    }

    async fn fetch_index(&self, base: &str) -> Result<String, MossError> {
        let response = self
            .http
            .get(base)
            .send()
            .await
            .map_err(|e| MossError::Connection(format!("report index fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(MossError::ReportParsing(format!(
                "report index returned {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| MossError::Connection(format!("report index read failed: {e}")))
    }

    /// Fetch all match pages through a sliding window of concurrent requests,
    /// preserving the index-to-page mapping regardless of completion order.
    async fn fetch_match_pages(
        &self,
        base: &str,
        count: usize,
    ) -> Result<Vec<(usize, String)>, MossError> {
        let mut pending = FuturesUnordered::new();
        let mut next = 0usize;
        while next < count && pending.len() < self.concurrency {
            pending.push(self.fetch_match_page(base, next));
            next += 1;
        }

        let mut pages = Vec::with_capacity(count);
        while let Some(result) = pending.next().await {
            pages.push(result?);
            if next < count {
                pending.push(self.fetch_match_page(base, next));
                next += 1;
            }
        }
        pages.sort_by_key(|(index, _)| *index);
        Ok(pages)
    }

    async fn fetch_match_page(
        &self,
        base: &str,
        index: usize,
    ) -> Result<(usize, String), MossError> {
        let url = format!("{base}match{index}-top.html");
        let mut last_error = String::new();

        for attempt in 0..self.retry_count {
            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.text().await {
                        Ok(text) => return Ok((index, text)),
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Ok(response) => {
                    // A missing or broken page will not improve on retry
                    return Err(MossError::ReportParsing(format!(
                        "{url} returned {}",
                        response.status()
                    )));
                }
                Err(e) => last_error = e.to_string(),
            }
            tracing::debug!(url = %url, attempt, error = %last_error, "Match page fetch failed");
        }

        Err(MossError::ReportDownloadTimeout(format!(
            "{url}: {last_error}"
        )))
    }
}
