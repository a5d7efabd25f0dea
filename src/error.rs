//! Error types.
//!
//! Failures are split by where they occur. [`ActionError`] and [`PlanError`]
//! come from the external collaborators; [`RunError`] is the run-level
//! taxonomy the scheduler reports to its caller. Item-scoped failures never
//! become a `RunError`: they are absorbed and logged by the executor.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the action executor (the remote repository API).
#[derive(Error, Debug)]
pub enum ActionError {
    /// Error returned by the GitHub API client.
    #[error("GitHub API error: {}", api_detail(.0))]
    Api(#[from] octocrab::Error),

    /// Repository identifier could not be resolved to `owner/repo`.
    #[error("Invalid repository identifier '{0}' (expected owner/repo)")]
    InvalidRepository(String),

    /// Item identifier is not usable for the requested call.
    #[error("Invalid item identifier '{0}'")]
    InvalidItemId(String),

    /// The token is valid but cannot write to the target repository.
    #[error("Token lacks push access to {0}")]
    PermissionDenied(String),

    /// A response was missing a field the executor depends on.
    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    /// The call did not finish within the executor's request timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Catch-all for scripted and non-HTTP failures.
    #[error("{0}")]
    Other(String),
}

/// Human-readable cause of an octocrab error.
///
/// GitHub's own error body carries the useful text (message, status and any
/// field-level validation errors). Transport failures are reduced to their
/// innermost cause.
fn api_detail(err: &octocrab::Error) -> String {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let mut detail = format!("{} ({})", source.message, source.status_code.as_u16());
            let reasons: Vec<&str> = source
                .errors
                .iter()
                .flatten()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect();
            if !reasons.is_empty() {
                detail.push_str(": ");
                detail.push_str(&reasons.join("; "));
            }
            detail
        }
        other => {
            let mut cause: &dyn std::error::Error = other;
            while let Some(next) = cause.source() {
                cause = next;
            }
            cause.to_string()
        }
    }
}

/// Errors raised by a plan generator.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Transport failure talking to the content service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The content service answered with a non-success status.
    #[error("Content service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The payload could not be decoded into activity specs.
    #[error("Malformed plan payload: {0}")]
    Malformed(String),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The generator produced no specs.
    #[error("Plan generator returned no activities")]
    Empty,
}

/// Run-level failures reported by the batch scheduler.
#[derive(Error, Debug)]
pub enum RunError {
    /// No credential was supplied; the run never started.
    #[error("GitHub token is required")]
    CredentialMissing,

    /// All requested counts were zero; the run never started.
    #[error("At least one operation must be requested")]
    NothingRequested,

    /// A run is already in progress on this state.
    #[error("A run is already in progress")]
    AlreadyRunning,

    /// Credential verification failed; the run was aborted before any chunk.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(#[source] ActionError),

    /// A failure outside the per-item boundary aborted the run.
    #[error("{0}")]
    UnexpectedSetupFailure(String),

    /// The run was cancelled at a chunk or dispatch boundary.
    #[error("Run cancelled")]
    Cancelled,
}

impl From<PlanError> for RunError {
    fn from(err: PlanError) -> Self {
        RunError::UnexpectedSetupFailure(format!("Plan generation failed: {}", err))
    }
}

/// Result type for run operations.
pub type RunResult<T> = Result<T, RunError>;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
