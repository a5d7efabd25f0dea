//! Per-item activity execution.
//!
//! [`ActivityExecutor::execute`] carries out exactly one spec against the
//! action client and records the result in the shared run state. Every
//! failure inside that boundary is caught and logged here; nothing
//! propagates to the chunk join or to sibling executions.

use std::sync::Arc;

use crate::activity::{ActivitySpec, ActivityType, GeneratedItem};
use crate::error::ActionError;
use crate::github::{ActionClient, AuthContext};
use crate::state::RunStateHandle;

/// What happened to a single spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Item created (no merge requested or not a pull request).
    Created,
    /// Pull request created and merged.
    Merged,
    /// Pull request created, merge follow-up failed. Item stays `created`.
    MergeFailed,
    /// Primary create call failed. No item, no counter.
    Failed,
    /// Spec type has no executor mapping.
    Skipped,
}

/// Executes specs for one run.
pub struct ActivityExecutor {
    client: Arc<dyn ActionClient>,
    state: RunStateHandle,
    auto_merge: bool,
}

impl ActivityExecutor {
    pub fn new(client: Arc<dyn ActionClient>, state: RunStateHandle, auto_merge: bool) -> Self {
        Self {
            client,
            state,
            auto_merge,
        }
    }

    /// Execute `spec` and count it as processed, whatever the outcome.
    pub async fn execute(&self, auth: &AuthContext, spec: &ActivitySpec) -> ExecutionOutcome {
        let outcome = self.run_spec(auth, spec).await;
        self.state.apply_update(|state| state.record_attempt());
        outcome
    }

    async fn run_spec(&self, auth: &AuthContext, spec: &ActivitySpec) -> ExecutionOutcome {
        let created = match spec.kind {
            ActivityType::Issue => {
                self.state.log(format!("Creating Issue: {}...", spec.title));
                self.client.create_issue(auth, spec).await
            }
            ActivityType::PullRequest => {
                self.state.log(format!("Creating PR: {}...", spec.title));
                self.client.create_pull_request(auth, spec).await
            }
            ActivityType::Commit => {
                self.state.log(format!("Pushing Commit: {}...", spec.title));
                self.client.create_commit(auth, spec).await
            }
            ActivityType::Discussion | ActivityType::Release => {
                self.state.log(format!(
                    "WARNING: Skipping unsupported activity {}: {}",
                    spec.kind, spec.title
                ));
                return ExecutionOutcome::Skipped;
            }
        };

        let item = match created {
            Ok(item) => item,
            Err(err) => {
                self.record_failure(spec, &err);
                return ExecutionOutcome::Failed;
            }
        };

        let id = item.id.clone();
        self.record_created(spec, item);

        if spec.kind == ActivityType::PullRequest && self.auto_merge {
            return self.merge(auth, &id).await;
        }
        ExecutionOutcome::Created
    }

    fn record_created(&self, spec: &ActivitySpec, mut item: GeneratedItem) {
        // Counters follow the requested type.
        item.kind = spec.kind;
        let line = format!("SUCCESS: Created {} #{}", item.kind, item.id);
        self.state.apply_update(|state| state.record_created(item));
        self.state.log(line);
    }

    fn record_failure(&self, spec: &ActivitySpec, err: &ActionError) {
        tracing::debug!(kind = %spec.kind, error = ?err, "create call failed");
        self.state
            .log(format!("ERROR: Failed to create {} - {}", spec.title, err));
    }

    /// Dependent follow-up. Failure is logged and swallowed.
    async fn merge(&self, auth: &AuthContext, id: &str) -> ExecutionOutcome {
        self.state.log(format!("Auto-Merging PR #{}...", id));
        match self.client.merge_pull_request(auth, id).await {
            Ok(()) => {
                let mut merged = false;
                self.state
                    .apply_update(|state| merged = state.mark_merged(id));
                if !merged {
                    tracing::warn!(id, "merged pull request not found in run state");
                }
                self.state.log(format!("SUCCESS: PR #{} Merged", id));
                ExecutionOutcome::Merged
            }
            Err(err) => {
                self.state
                    .log(format!("WARNING: Failed to auto-merge PR #{}: {}", id, err));
                ExecutionOutcome::MergeFailed
            }
        }
    }
}
