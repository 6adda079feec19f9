//! Data model for submissions and parsed reports

use crate::error::MossError;
use moss_common::MossLanguage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One file handed to the service for comparison
///
/// Immutable once constructed; the core only reads it. File ids are not part
/// of the file itself: id 0 is reserved for base/reference files, ids 1..N
/// are assigned to comparison files in upload order.
#[derive(Debug, Clone)]
pub struct SubmissionFile {
    /// Logical name shown in the report (normalized at upload time)
    pub name: String,
    /// Raw file content, sent verbatim after the header line
    pub content: Vec<u8>,
    /// Language tag sent in the file header (wire name)
    pub language: String,
}

impl SubmissionFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content,
            language: language.into(),
        }
    }
}

/// Options for one submission job
///
/// Validated before any network I/O; numeric limits are strictly positive
/// and the language must be in the supported set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Language wire name (e.g. `python`, `cc`)
    pub language: String,
    /// Treat uploads as directories of files belonging to one submission
    pub directory_mode: bool,
    /// Route to the service's experimental server
    pub experimental: bool,
    /// Occurrences of a passage before it is ignored as boilerplate
    pub max_until_ignored: u32,
    /// Number of matched files shown in the report
    pub max_displayed_matches: u32,
    /// Free-text comment attached to the report
    pub comment: String,
    /// Strip directories from display names
    pub use_basename: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            language: MossLanguage::Python.wire_name().to_string(),
            directory_mode: false,
            experimental: false,
            max_until_ignored: 10,
            max_displayed_matches: 250,
            comment: String::new(),
            use_basename: false,
        }
    }
}

impl JobOptions {
    /// Validate options locally, before any socket is opened
    pub fn validate(&self) -> Result<(), MossError> {
        if MossLanguage::from_str(&self.language).is_err() {
            return Err(MossError::UnsupportedLanguage(self.language.clone()));
        }
        if self.max_until_ignored == 0 {
            return Err(MossError::InvalidParameter(
                "max_until_ignored must be positive".to_string(),
            ));
        }
        if self.max_displayed_matches == 0 {
            return Err(MossError::InvalidParameter(
                "max_displayed_matches must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// An inclusive line interval on one side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub from: u32,
    pub to: u32,
}

impl LineRange {
    /// Interval width, exclusive of the `+1` applied when counting lines
    pub fn span(&self) -> u32 {
        self.to - self.from
    }
}

/// One matched region: a line range per participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePair {
    pub first: LineRange,
    pub second: LineRange,
}

impl LinePair {
    /// Lines this region contributes to the match total
    pub fn line_count(&self) -> u32 {
        self.first.span().max(self.second.span()) + 1
    }
}

/// One pairwise similarity result between two submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub first_name: String,
    pub first_percent: u32,
    pub second_name: String,
    pub second_percent: u32,
    /// Matched regions in report order
    pub line_matches: Vec<LinePair>,
    /// Total matched lines, summed over regions
    pub lines_matched: u32,
}

/// A fully fetched and parsed report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MossReport {
    /// The result URL the report was fetched from
    pub url: String,
    /// Parsed matches, in report index order
    pub matches: Vec<MatchRecord>,
    /// Indices of matches omitted because their fragment was unparseable
    pub skipped_matches: Vec<usize>,
}

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("hard-coded whitespace pattern"));

/// Normalize a display name for the `file` header line
///
/// The service treats the name as a single whitespace-delimited token, so
/// internal whitespace collapses to `_` and backslashes become `/`.
pub fn normalize_display_name(name: &str, use_basename: bool) -> String {
    let name = if use_basename {
        name.rsplit(['/', '\\']).next().unwrap_or(name)
    } else {
        name
    };
    WHITESPACE_RUN
        .replace_all(name, "_")
        .replace('\\', "/")
}
