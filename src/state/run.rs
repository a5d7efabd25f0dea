//! Shared run state and its single-writer handle.
//!
//! [`RunState`] is the one snapshot every observer reads. It lives inside a
//! `tokio::sync::watch` channel owned by [`RunStateHandle`]; every mutation is
//! applied through `send_modify`, so concurrent item executions never race on
//! a counter increment or an item prepend, and subscribers are woken after
//! each update.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::activity::GeneratedItem;
use crate::state::log_sink::{trace_line, LogSink};
use crate::state::stats::Stats;

/// Initial status line of a fresh state.
pub const INITIAL_LOG_LINE: &str = "Waiting for credentials...";

/// Number of progress samples kept for charting.
pub const PROGRESS_SAMPLE_LIMIT: usize = 20;

/// Run lifecycle.
///
/// `Idle -> Running -> Complete`, with `Running -> Idle` on a fatal error.
/// Both `Idle` and `Complete` may start a new run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    #[default]
    Idle,
    Running,
    Complete,
}

/// Completed-attempt tally at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub at: DateTime<Utc>,
    pub completed: usize,
}

/// Snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub lifecycle: Lifecycle,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub logs: LogSink,
    /// Newest first.
    pub items: Vec<GeneratedItem>,
    pub stats: Stats,
    /// Specs processed so far, successful or not.
    pub completed: usize,
    /// Requested operations for the current run.
    pub total: usize,
    pub progress_samples: VecDeque<ProgressSample>,
}

impl Default for RunState {
    fn default() -> Self {
        let mut logs = LogSink::new();
        logs.push(INITIAL_LOG_LINE);
        Self {
            lifecycle: Lifecycle::Idle,
            progress: 0.0,
            logs,
            items: Vec::new(),
            stats: Stats::default(),
            completed: 0,
            total: 0,
            progress_samples: VecDeque::new(),
        }
    }
}

impl RunState {
    /// Enter `Running`, clearing per-run data. Logs are kept.
    pub fn begin_run(&mut self, total: usize) {
        self.lifecycle = Lifecycle::Running;
        self.progress = 0.0;
        self.items.clear();
        self.stats = Stats::default();
        self.completed = 0;
        self.total = total;
        self.progress_samples.clear();
    }

    /// Count a successful creation and prepend its item.
    pub fn record_created(&mut self, item: GeneratedItem) {
        self.stats.increment(item.kind);
        self.items.insert(0, item);
    }

    /// Transition the item with `id` from created to merged.
    pub fn mark_merged(&mut self, id: &str) -> bool {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .map(GeneratedItem::mark_merged)
            .unwrap_or(false)
    }

    /// Count one processed spec and advance progress.
    pub fn record_attempt(&mut self) {
        self.completed += 1;
        if self.total > 0 {
            let fraction = (self.completed as f64 / self.total as f64) * 100.0;
            // Progress never moves backwards while running.
            self.progress = fraction.min(100.0).max(self.progress);
        }
        if self.progress_samples.len() >= PROGRESS_SAMPLE_LIMIT {
            self.progress_samples.pop_front();
        }
        self.progress_samples.push_back(ProgressSample {
            at: Utc::now(),
            completed: self.completed,
        });
    }

    /// Finish the run: lifecycle `Complete`, progress pinned at 100.
    pub fn complete(&mut self) {
        self.lifecycle = Lifecycle::Complete;
        self.progress = 100.0;
    }

    /// Abandon the run. Accumulated items and stats stay in place.
    pub fn abandon(&mut self) {
        self.lifecycle = Lifecycle::Idle;
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }
}

/// Cloneable handle to the shared [`RunState`].
#[derive(Debug, Clone)]
pub struct RunStateHandle {
    tx: Arc<watch::Sender<RunState>>,
}

impl Default for RunStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Apply `f` atomically and notify subscribers.
    pub fn apply_update<F>(&self, f: F)
    where
        F: FnOnce(&mut RunState),
    {
        self.tx.send_modify(f);
    }

    /// Append a status line (also mirrored to tracing).
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        trace_line(&line);
        self.apply_update(|state| state.logs.push(line));
    }

    /// Clone the current state.
    pub fn snapshot(&self) -> RunState {
        self.tx.borrow().clone()
    }

    /// Read from the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        let state = self.tx.borrow();
        f(&*state)
    }

    /// Receive a notification after every update.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }
}
