//! In-memory collaborators for driving the scheduler without the network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use historian::github::{ActionClient, AuthContext};
use historian::plan::PlanGenerator;
use historian::scheduler::{CancelHandle, Cooldown, RunConfig};
use historian::state::{Lifecycle, RunStateHandle};
use historian::{ActionError, ActivitySpec, ActivityType, GeneratedItem, PlanError};

/// Action client with scripted failures and call accounting.
#[derive(Default)]
pub struct ScriptedClient {
    auth_error: Option<String>,
    failing_titles: HashSet<String>,
    fail_merge: bool,
    latency: Duration,
    observer: Option<RunStateHandle>,

    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub merge_calls: AtomicUsize,
    /// Lifecycle observed when credentials were verified.
    pub lifecycle_at_verify: Mutex<Option<Lifecycle>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            ..Default::default()
        }
    }

    pub fn rejecting_credentials(mut self, message: &str) -> Self {
        self.auth_error = Some(message.to_string());
        self
    }

    pub fn failing(mut self, title: &str) -> Self {
        self.failing_titles.insert(title.to_string());
        self
    }

    pub fn failing_merges(mut self) -> Self {
        self.fail_merge = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn observing(mut self, state: RunStateHandle) -> Self {
        self.observer = Some(state);
        self
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn merges(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }

    async fn create(&self, spec: &ActivitySpec) -> Result<GeneratedItem, ActionError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_titles.contains(&spec.title) {
            return Err(ActionError::Other("422 Validation Failed".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedItem::created(spec, id.to_string(), "octocat"))
    }
}

#[async_trait]
impl ActionClient for ScriptedClient {
    async fn verify_credentials(
        &self,
        token: &str,
        repo: &str,
    ) -> Result<AuthContext, ActionError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(state) = &self.observer {
            let lifecycle = state.read(|s| s.lifecycle);
            *self.lifecycle_at_verify.lock().unwrap() = Some(lifecycle);
        }
        if let Some(message) = &self.auth_error {
            return Err(ActionError::Other(message.clone()));
        }
        let (owner, name) = repo.split_once('/').unwrap_or(("octocat", repo));
        Ok(AuthContext::new(token, owner, name, "main", "octocat"))
    }

    async fn create_issue(
        &self,
        _auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError> {
        self.create(spec).await
    }

    async fn create_pull_request(
        &self,
        _auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError> {
        self.create(spec).await
    }

    async fn merge_pull_request(
        &self,
        _auth: &AuthContext,
        item_id: &str,
    ) -> Result<(), ActionError> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_merge {
            return Err(ActionError::Other(format!(
                "Pull request #{} is not mergeable",
                item_id
            )));
        }
        Ok(())
    }

    async fn create_commit(
        &self,
        _auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError> {
        self.create(spec).await
    }
}

/// Plan generator returning a fixed plan, or failing.
pub struct FixedPlan(pub Result<Vec<ActivitySpec>, String>);

impl FixedPlan {
    pub fn of(specs: Vec<ActivitySpec>) -> Self {
        Self(Ok(specs))
    }

    pub fn failing(message: &str) -> Self {
        Self(Err(message.to_string()))
    }
}

#[async_trait]
impl PlanGenerator for FixedPlan {
    async fn generate(
        &self,
        _language: &str,
        _repo: &str,
        _count: usize,
    ) -> Result<Vec<ActivitySpec>, PlanError> {
        self.0.clone().map_err(PlanError::Malformed)
    }
}

/// Cooldown that returns immediately and records the completed tally at
/// every pause. Optionally cancels the run while pausing.
pub struct RecordingCooldown {
    state: RunStateHandle,
    cancel_on_pause: Option<CancelHandle>,
    pub pauses: Mutex<Vec<(usize, usize)>>,
}

impl RecordingCooldown {
    pub fn new(state: RunStateHandle) -> Self {
        Self {
            state,
            cancel_on_pause: None,
            pauses: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling(mut self, cancel: CancelHandle) -> Self {
        self.cancel_on_pause = Some(cancel);
        self
    }

    /// `(chunk index, completed attempts)` per pause.
    pub fn pauses(&self) -> Vec<(usize, usize)> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cooldown for RecordingCooldown {
    async fn pause(&self, completed_chunk: usize, _interval: Duration) {
        let completed = self.state.read(|s| s.completed);
        self.pauses.lock().unwrap().push((completed_chunk, completed));
        if let Some(cancel) = &self.cancel_on_pause {
            cancel.cancel();
        }
    }
}

pub fn spec(kind: ActivityType, title: &str) -> ActivitySpec {
    ActivitySpec::new(kind, title, format!("{} details", title))
}

/// Issue A, PR B, Commit C, PR D, Issue E.
pub fn mixed_plan() -> Vec<ActivitySpec> {
    vec![
        spec(ActivityType::Issue, "A"),
        spec(ActivityType::PullRequest, "B"),
        spec(ActivityType::Commit, "C"),
        spec(ActivityType::PullRequest, "D"),
        spec(ActivityType::Issue, "E"),
    ]
}

pub fn run_config(issues: u32, prs: u32, commits: u32) -> RunConfig {
    RunConfig {
        token: "ghp_test".to_string(),
        repo: "octocat/hello-world".to_string(),
        issue_count: issues,
        pr_count: prs,
        commit_count: commits,
        cooldown: Duration::ZERO,
        ..RunConfig::default()
    }
}
