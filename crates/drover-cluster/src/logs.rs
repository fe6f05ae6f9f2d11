//! Step failure logs: where they live, and how to make them readable.
//!
//! A failed step leaves a gzip-compressed `stderr.gz` under the cluster's
//! log URI at `{log_uri}/{cluster_id}/steps/{step_id}/`. The control plane
//! usually reports that directory in the step's failure details.

use std::fmt;
use std::io::Read;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use drover_core::{ClusterId, DroverError, Result, StepId, SCHEME};

/// File name of the compressed standard error log of a step.
pub const STDERR_LOG: &str = "stderr.gz";

/// Schemes the control plane may use for log locations, all of which
/// address the same object store.
const ALT_SCHEMES: &[&str] = &["s3n://", "s3a://"];

/// The error log of a failed step, or why it could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorLog {
    /// Decompressed, display-ready log text.
    Available { path: String, text: String },
    /// The log could not be fetched; the step state is still valid.
    Unavailable { path: Option<String>, reason: String },
}

impl ErrorLog {
    pub fn text(&self) -> Option<&str> {
        match self {
            ErrorLog::Available { text, .. } => Some(text),
            ErrorLog::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ErrorLog::Available { .. })
    }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLog::Available { text, .. } => f.write_str(text),
            ErrorLog::Unavailable {
                path: Some(path),
                reason,
            } => write!(f, "[error log unavailable at {path}: {reason}]"),
            ErrorLog::Unavailable { path: None, reason } => {
                write!(f, "[error log unavailable: {reason}]")
            }
        }
    }
}

/// Where the `stderr.gz` of a step lives.
///
/// A location reported by the control plane wins; otherwise the path is
/// derived from the configured log URI. `None` when neither is known.
pub fn stderr_path(
    reported: Option<&str>,
    log_uri: Option<&str>,
    cluster_id: &ClusterId,
    step_id: &StepId,
) -> Option<String> {
    if let Some(reported) = reported.map(str::trim).filter(|r| !r.is_empty()) {
        let reported = normalize_scheme(reported);
        if reported.ends_with(STDERR_LOG) {
            return Some(reported);
        }
        return Some(format!("{}/{STDERR_LOG}", reported.trim_end_matches('/')));
    }

    let base = normalize_scheme(log_uri?.trim());
    Some(format!(
        "{}/{cluster_id}/steps/{step_id}/{STDERR_LOG}",
        base.trim_end_matches('/')
    ))
}

fn normalize_scheme(path: &str) -> String {
    for alt in ALT_SCHEMES {
        if let Some(rest) = path.strip_prefix(alt) {
            return format!("{SCHEME}{rest}");
        }
    }
    path.to_string()
}

/// Check the gzip magic bytes.
#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Decompress a gzip log. Plain-text logs are passed through.
pub fn decompress(data: &[u8]) -> Result<String> {
    if !is_gzip(data) {
        return Ok(String::from_utf8_lossy(data).into_owned());
    }
    let mut decoder = GzDecoder::new(data);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| DroverError::format("Failed to decompress log", e))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Turn raw log text into something pleasant in a terminal.
///
/// Literal `\n` and `\t` escape sequences become real line breaks and tabs,
/// CRLF becomes LF, and trailing whitespace is dropped.
pub fn format_for_display(raw: &str) -> String {
    let unescaped = raw
        .replace("\r\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", "\t");
    let lines: Vec<&str> = unescaped.lines().map(str::trim_end).collect();
    lines.join("\n").trim_end().to_string()
}
