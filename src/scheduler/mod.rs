//! Batch execution scheduler.
//!
//! Drives a run from a plan to a terminal lifecycle state: the plan is cut
//! into fixed-size chunks, each chunk's specs are executed concurrently and
//! joined, and a cooldown pause separates consecutive chunks.

pub mod cancel;
pub mod cooldown;

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::activity::ActivitySpec;
use crate::error::{PlanError, RunError, RunResult};
use crate::executor::{ActivityExecutor, ExecutionOutcome};
use crate::github::ActionClient;
use crate::plan::PlanGenerator;
use crate::state::{RunStateHandle, Stats};

pub use cancel::CancelHandle;
pub use cooldown::{Cooldown, FixedCooldown, DEFAULT_COOLDOWN};

/// Default number of specs executed concurrently per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 3;

/// Settings for one run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// API token. Empty means no credential.
    pub token: String,
    /// Target repository, `owner/repo`.
    pub repo: String,
    /// Language hint passed to the plan generator.
    pub language: String,
    /// Requested issues.
    pub issue_count: u32,
    /// Requested pull requests.
    pub pr_count: u32,
    /// Requested commits.
    pub commit_count: u32,
    /// Merge each pull request right after it is created.
    pub auto_merge: bool,
    /// Specs executed concurrently per chunk.
    pub chunk_size: usize,
    /// Pause between chunks.
    pub cooldown: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: "username/turbo-repo".to_string(),
            language: "TypeScript".to_string(),
            issue_count: 5,
            pr_count: 5,
            commit_count: 5,
            auto_merge: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl RunConfig {
    /// Requested operations, independent of the plan actually produced.
    pub fn total(&self) -> usize {
        self.issue_count as usize + self.pr_count as usize + self.commit_count as usize
    }
}

/// Outcome tally of a completed run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Operations originally requested.
    pub requested: usize,
    /// Specs processed, successful or not.
    pub attempted: usize,
    /// Items created (merged pull requests included).
    pub created: usize,
    /// Pull requests merged after creation.
    pub merged: usize,
    /// Pull requests created whose merge follow-up failed.
    pub merge_failures: usize,
    /// Specs whose create call failed.
    pub failed: usize,
    /// Specs of a type the executor does not handle.
    pub skipped: usize,
    /// Per-type success counters at the end of the run.
    pub stats: Stats,
}

impl RunSummary {
    fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: ExecutionOutcome) {
        self.attempted += 1;
        match outcome {
            ExecutionOutcome::Created => self.created += 1,
            ExecutionOutcome::Merged => {
                self.created += 1;
                self.merged += 1;
            }
            ExecutionOutcome::MergeFailed => {
                self.created += 1;
                self.merge_failures += 1;
            }
            ExecutionOutcome::Failed => self.failed += 1,
            ExecutionOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Number of cooldown pauses for a plan of `plan_len` specs.
pub fn cooldown_count(plan_len: usize, chunk_size: usize) -> usize {
    chunk_count(plan_len, chunk_size).saturating_sub(1)
}

/// Number of chunks for a plan of `plan_len` specs.
pub fn chunk_count(plan_len: usize, chunk_size: usize) -> usize {
    plan_len.div_ceil(chunk_size.max(1))
}

/// Runs plans against an action client.
pub struct BatchScheduler {
    client: Arc<dyn ActionClient>,
    planner: Arc<dyn PlanGenerator>,
    cooldown: Arc<dyn Cooldown>,
    state: RunStateHandle,
    cancel: CancelHandle,
}

impl BatchScheduler {
    /// Scheduler with a fresh run state and a [`FixedCooldown`].
    pub fn new(client: Arc<dyn ActionClient>, planner: Arc<dyn PlanGenerator>) -> Self {
        Self {
            client,
            planner,
            cooldown: Arc::new(FixedCooldown),
            state: RunStateHandle::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Replace the inter-chunk pause policy.
    pub fn with_cooldown(mut self, cooldown: Arc<dyn Cooldown>) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Share an existing state handle (e.g. one the UI already observes).
    pub fn with_state(mut self, state: RunStateHandle) -> Self {
        self.state = state;
        self
    }

    /// Handle observers subscribe to.
    pub fn state(&self) -> &RunStateHandle {
        &self.state
    }

    /// Handle that cancels the current run at the next boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run `config` to completion.
    ///
    /// Returns `Ok` once every chunk has been joined and the lifecycle is
    /// `Complete`. A missing credential or empty request leaves the state
    /// `Idle`; any failure after the run started moves it back to `Idle`
    /// with partial results kept.
    pub async fn start(&self, config: &RunConfig) -> RunResult<RunSummary> {
        let token = config.token.trim();
        if token.is_empty() {
            self.state.log("ERROR: GitHub token is required to start a run.");
            return Err(RunError::CredentialMissing);
        }

        let total = config.total();
        if total == 0 {
            self.state
                .log("ERROR: At least one issue, pull request or commit must be requested.");
            return Err(RunError::NothingRequested);
        }

        let mut started = false;
        self.state.apply_update(|state| {
            if !state.is_running() {
                state.begin_run(total);
                started = true;
            }
        });
        if !started {
            tracing::warn!("start requested while a run is in progress");
            return Err(RunError::AlreadyRunning);
        }
        self.cancel.reset();

        let span = tracing::info_span!("run", repo = %config.repo, total);
        match self.drive(config, token, total).instrument(span).await {
            Ok(summary) => {
                self.state.log("ALL OPERATIONS COMPLETED.");
                self.state.apply_update(|state| state.complete());
                Ok(summary)
            }
            Err(err) => {
                match &err {
                    RunError::Cancelled => self.state.log("Run cancelled."),
                    other => self.state.log(format!("CRITICAL FAILURE: {}", other)),
                }
                self.state.apply_update(|state| state.abandon());
                Err(err)
            }
        }
    }

    async fn drive(&self, config: &RunConfig, token: &str, total: usize) -> RunResult<RunSummary> {
        self.state.log("Authenticating with GitHub...");
        let auth = self
            .client
            .verify_credentials(token, &config.repo)
            .await
            .map_err(RunError::AuthenticationFailure)?;
        self.state
            .log(format!("SUCCESS: Connected to {}", auth.full_name()));

        self.state.log("Generating activity plan...");
        let plan = self
            .planner
            .generate(&config.language, &config.repo, total)
            .await?;
        if plan.is_empty() {
            return Err(PlanError::Empty.into());
        }
        self.state
            .log(format!("Generated {} activity templates.", plan.len()));

        let executor = Arc::new(ActivityExecutor::new(
            self.client.clone(),
            self.state.clone(),
            config.auto_merge,
        ));
        let auth = Arc::new(auth);
        let chunk_size = config.chunk_size.max(1);
        let chunks: Vec<&[ActivitySpec]> = plan.chunks(chunk_size).collect();
        let pauses = cooldown_count(plan.len(), chunk_size);
        tracing::debug!(chunks = chunk_count(plan.len(), chunk_size), pauses, "plan chunked");
        let mut summary = RunSummary::new(total);

        for (index, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            tracing::debug!(chunk = index, size = chunk.len(), "dispatching chunk");

            // Fan out.
            let mut handles = Vec::with_capacity(chunk.len());
            let mut cancelled = false;
            for spec in chunk.iter() {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let executor = executor.clone();
                let auth = auth.clone();
                let spec = spec.clone();
                let span = tracing::debug_span!("activity", kind = %spec.kind);
                handles.push(tokio::spawn(
                    async move { executor.execute(&auth, &spec).await }.instrument(span),
                ));
            }

            // Fan in: the next chunk never starts before every task here is done.
            for result in futures::future::join_all(handles).await {
                match result {
                    Ok(outcome) => summary.record(outcome),
                    Err(join_err) => {
                        self.state
                            .log(format!("ERROR: Activity task aborted - {}", join_err));
                        self.state.apply_update(|state| state.record_attempt());
                        summary.record(ExecutionOutcome::Failed);
                    }
                }
            }

            if cancelled {
                return Err(RunError::Cancelled);
            }

            if index < pauses {
                self.state.log("Cooling down (Rate Limit Protection)...");
                self.cooldown.pause(index, config.cooldown).await;
            }
        }

        summary.stats = self.state.read(|state| state.stats);
        Ok(summary)
    }
}
