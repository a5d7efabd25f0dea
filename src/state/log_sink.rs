//! Bounded, append-only buffer of human-readable status lines.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of prior lines retained when a new line is appended.
pub const LOG_RETAINED: usize = 100;

/// Maximum number of lines held at any time (retained lines plus the new one).
pub const LOG_CAPACITY: usize = LOG_RETAINED + 1;

/// Ordered, oldest-first log buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogSink {
    lines: VecDeque<String>,
    /// Lines ever appended, including dropped ones.
    #[serde(skip)]
    appended: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, dropping the oldest entries so that at most
    /// [`LOG_RETAINED`] prior lines survive.
    pub fn push(&mut self, line: impl Into<String>) {
        while self.lines.len() > LOG_RETAINED {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.appended += 1;
    }

    /// Total number of lines ever appended to this buffer.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Retained lines appended after the first `seen` lines.
    ///
    /// Lines already dropped from the buffer are skipped.
    pub fn since(&self, seen: u64) -> impl Iterator<Item = &str> {
        let fresh = self.appended.saturating_sub(seen).min(self.lines.len() as u64) as usize;
        self.lines
            .iter()
            .skip(self.lines.len() - fresh)
            .map(String::as_str)
    }

    /// Lines currently retained.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Most recent line.
    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    /// Owned copy of the retained lines, oldest first.
    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Severity of a status line, derived from its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Error,
    Warning,
    Success,
    Info,
}

impl LineLevel {
    pub fn of(line: &str) -> Self {
        if line.starts_with("ERROR") || line.starts_with("CRITICAL FAILURE") {
            LineLevel::Error
        } else if line.starts_with("WARNING") {
            LineLevel::Warning
        } else if line.starts_with("SUCCESS") || line.starts_with("ALL OPERATIONS COMPLETED") {
            LineLevel::Success
        } else {
            LineLevel::Info
        }
    }
}

/// Mirror a status line into the tracing stream.
pub(crate) fn trace_line(line: &str) {
    match LineLevel::of(line) {
        LineLevel::Error => tracing::error!(target: "historian::run", "{}", line),
        LineLevel::Warning => tracing::warn!(target: "historian::run", "{}", line),
        LineLevel::Success | LineLevel::Info => {
            tracing::info!(target: "historian::run", "{}", line)
        }
    }
}
