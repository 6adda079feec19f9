//! Wire protocol client for the submission service
//!
//! One TCP connection per submission session. The protocol is line-oriented:
//! newline-terminated text commands, with raw file bytes following each
//! `file` header. The session is strictly sequential, one in-flight command
//! at a time, and never shared across tasks. Any error aborts the session;
//! recovery is a fresh session, decided by the retry orchestrator.

use crate::config::MossConfig;
use crate::error::{lookup_server_error, MossError};
use crate::types::{normalize_display_name, JobOptions, SubmissionFile};
use moss_common::MossLanguage;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Session lifecycle. Operations check the current state so out-of-order use
/// is reported locally instead of desynchronizing the remote end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connected,
    Configured,
    Uploading,
    Finalized,
    Closed,
}

/// An open submission session
#[derive(Debug)]
pub struct MossSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    state: SessionState,
    read_timeout: Duration,
    expected_host: String,
}

impl MossSession {
    /// Open a connection and authenticate
    pub async fn connect(config: &MossConfig, user_id: &str) -> Result<Self, MossError> {
        let host = config.server_host.as_str();
        let port = config.server_port;
        let stream = timeout(
            config.connect_timeout(),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| MossError::Connection(format!("connect to {host}:{port} timed out")))?
        .map_err(|e| MossError::Connection(format!("connect to {host}:{port} failed: {e}")))?;

        let (read_half, write_half) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            state: SessionState::Connected,
            read_timeout: config.session_read_timeout(),
            expected_host: config.server_host.clone(),
        };
        session.send_line(&format!("moss {user_id}")).await?;
        tracing::debug!(host, port, "Opened submission session");
        Ok(session)
    }

    /// Send all option commands and read the language acknowledgement
    pub async fn configure(&mut self, options: &JobOptions) -> Result<(), MossError> {
        if self.state != SessionState::Connected {
            return Err(MossError::InvalidRequest(
                "configure called on a session that is not freshly connected".to_string(),
            ));
        }

        self.set_directory(options.directory_mode).await?;
        self.set_experimental(options.experimental).await?;
        self.set_max_matches(options.max_until_ignored).await?;
        self.set_max_displayed_matches(options.max_displayed_matches)
            .await?;
        self.set_language(&options.language).await?;

        // The service acknowledges the language choice; everything before it
        // is accepted silently.
        let ack = self.read_line().await?;
        match ack.as_str() {
            "yes" => {
                self.state = SessionState::Configured;
                Ok(())
            }
            "no" => Err(MossError::UnsupportedLanguage(options.language.clone())),
            "" => Err(MossError::EmptyResponse),
            other => Err(MossError::InvalidRequest(format!(
                "unexpected language acknowledgement: \"{other}\""
            ))),
        }
    }

    pub async fn set_directory(&mut self, enabled: bool) -> Result<(), MossError> {
        self.send_line(&format!("directory {}", enabled as u8)).await
    }

    pub async fn set_experimental(&mut self, enabled: bool) -> Result<(), MossError> {
        self.send_line(&format!("X {}", enabled as u8)).await
    }

    pub async fn set_max_matches(&mut self, max_matches: u32) -> Result<(), MossError> {
        if max_matches == 0 {
            return Err(MossError::InvalidParameter(
                "maxmatches must be positive".to_string(),
            ));
        }
        self.send_line(&format!("maxmatches {max_matches}")).await
    }

    pub async fn set_max_displayed_matches(&mut self, count: u32) -> Result<(), MossError> {
        if count == 0 {
            return Err(MossError::InvalidParameter(
                "show must be positive".to_string(),
            ));
        }
        self.send_line(&format!("show {count}")).await
    }

    pub async fn set_language(&mut self, language: &str) -> Result<(), MossError> {
        if MossLanguage::from_str(language).is_err() {
            return Err(MossError::UnsupportedLanguage(language.to_string()));
        }
        self.send_line(&format!("language {language}")).await
    }

    /// Upload one file: header line, then exactly `content.len()` raw bytes
    ///
    /// `file_id` 0 is reserved for base/reference files; comparison files use
    /// 1..N in upload order.
    pub async fn upload_file(
        &mut self,
        file: &SubmissionFile,
        file_id: u32,
        use_basename: bool,
    ) -> Result<(), MossError> {
        if !matches!(
            self.state,
            SessionState::Configured | SessionState::Uploading
        ) {
            return Err(MossError::InvalidRequest(
                "upload_file called before configure".to_string(),
            ));
        }
        self.state = SessionState::Uploading;

        let name = normalize_display_name(&file.name, use_basename);
        self.send_line(&format!(
            "file {file_id} {} {} {name}",
            file.language,
            file.content.len()
        ))
        .await?;
        self.send_raw(&file.content).await?;
        tracing::debug!(file_id, name = %name, bytes = file.content.len(), "Uploaded file");
        Ok(())
    }

    /// Send the terminal query and classify the service's one-line answer
    pub async fn finalize(&mut self, comment: &str) -> Result<String, MossError> {
        if !matches!(
            self.state,
            SessionState::Configured | SessionState::Uploading
        ) {
            return Err(MossError::InvalidRequest(
                "finalize called before configure".to_string(),
            ));
        }

        self.send_line(&format!("query 0 {comment}")).await?;
        let line = self.read_line().await?;
        self.state = SessionState::Finalized;

        if line.is_empty() {
            // The service closed the session (or answered a bare newline)
            // without producing a result; the retry controller decides what
            // that means by consulting the latency monitor.
            return Err(MossError::EmptyResponse);
        }
        if is_valid_moss_url(&line, &self.expected_host) {
            return Ok(line);
        }
        if let Some(msg) = line.strip_prefix("Error:") {
            return Err(lookup_server_error(msg.trim())
                .unwrap_or_else(|| MossError::Protocol(line.clone())));
        }
        Err(MossError::Protocol(format!(
            "unrecognized response: \"{line}\""
        )))
    }

    /// Terminate the session: send `end`, shut the socket down
    ///
    /// Idempotent, and always best-effort: a session that died mid-upload
    /// cannot deliver `end`, and close must never mask the error that broke
    /// it.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        if let Err(e) = self.writer.write_all(b"end\n").await {
            tracing::debug!(error = %e, "Session already broken at close");
            return;
        }
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "Socket shutdown failed at close");
        }
    }

    async fn send_line(&mut self, line: &str) -> Result<(), MossError> {
        self.send_raw(format!("{line}\n").as_bytes()).await
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), MossError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| MossError::Connection(format!("write failed: {e}")))
    }

    /// Read one line, without its terminator. EOF reads as an empty line,
    /// matching the service's behavior of closing the session instead of
    /// answering when it gives up.
    async fn read_line(&mut self) -> Result<String, MossError> {
        let mut line = String::new();
        let n = timeout(self.read_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| MossError::Connection("read timed out".to_string()))?
            .map_err(|e| MossError::Connection(format!("read failed: {e}")))?;
        if n == 0 {
            return Ok(String::new());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Whether `url` points at the expected service host over http(s)
///
/// Result URLs are re-validated with this before every reuse; anything else
/// forces regeneration.
pub fn is_valid_moss_url(url: &str, expected_host: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str() == Some(expected_host)
        }
        Err(_) => false,
    }
}
