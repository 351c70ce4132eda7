//! Solution logging via custom-scheme URL hand-off
//!
//! Solved puzzles are reported to an external logbook application that
//! registers a custom URL scheme. Submission is a one-shot hand-off to the
//! platform opener with no confirmation of delivery.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// URL scheme the logbook application registers
pub const DEFAULT_SCHEME: &str = "appquest";

/// Command used to hand a URL to the platform
pub const DEFAULT_OPENER: &str = "xdg-open";

/// Payload shape submitted for a solved task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionPayload {
    /// Name of the solved task
    pub task: String,
    /// Solution string, usually a scanned QR code
    pub solution: String,
}

impl SolutionPayload {
    /// Create a payload for a task/solution pair
    pub fn new(task: impl Into<String>, solution: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            solution: solution.into(),
        }
    }
}

/// Serialize a payload to a JSON text blob.
///
/// Returns an empty string when serialization fails. Callers must treat an
/// empty result as a silent failure; the hand-off then degrades to a no-op.
pub fn json_stringify<T: Serialize>(payload: &T) -> String {
    match serde_json::to_string(payload) {
        Ok(json) => json,
        Err(err) => {
            debug!(error = %err, "solution payload serialization failed");
            String::new()
        }
    }
}

/// Submits solution strings to the logbook application
pub struct SolutionLogger {
    scheme: String,
    opener: String,
}

impl SolutionLogger {
    /// Logger using the default scheme and platform opener
    pub fn new() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            opener: DEFAULT_OPENER.to_string(),
        }
    }

    /// Logger with explicit scheme and opener command
    pub fn with_endpoint(scheme: impl Into<String>, opener: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            opener: opener.into(),
        }
    }

    /// Compose the submission URL for a solution string.
    ///
    /// The solution is percent-encoded so it is safe as a URL path segment.
    pub fn submit_url(&self, solution: &str) -> String {
        format!(
            "{}://submit/{}",
            self.scheme,
            urlencoding::encode(solution)
        )
    }

    /// Hand the solution to the platform, fire-and-forget.
    ///
    /// Reports only whether the opener could be spawned; delivery is never
    /// confirmed.
    pub fn log_solution(&self, solution: &str) -> Result<()> {
        let url = self.submit_url(solution);
        info!(%url, "submitting solution");

        Command::new(&self.opener)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Submission(format!("Failed to spawn {}: {e}", self.opener)))?;

        Ok(())
    }
}

impl Default for SolutionLogger {
    fn default() -> Self {
        Self::new()
    }
}
