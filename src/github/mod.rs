//! Action executor seam for the remote repository API.
//!
//! [`ActionClient`] is the contract the scheduler and executor depend on.
//! [`OctocrabClient`] implements it against the GitHub REST API.

pub mod client;
pub mod contributors;

use std::fmt;

use async_trait::async_trait;

use crate::activity::{ActivitySpec, GeneratedItem};
use crate::error::ActionError;

pub use client::OctocrabClient;
pub use contributors::{default_roster, CoAuthorPicker, Contributor};

/// `owner/repo` pair parsed from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentifier {
    pub owner: String,
    pub repo: String,
}

impl RepoIdentifier {
    /// Parse `owner/repo`, optionally given as a github.com URL and/or with a
    /// trailing `.git`.
    pub fn parse(input: &str) -> Result<Self, ActionError> {
        let invalid = || ActionError::InvalidRepository(input.to_string());

        let mut rest = input.trim();
        for prefix in ["https://", "http://"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
            }
        }
        if let Some(stripped) = rest.strip_prefix("www.") {
            rest = stripped;
        }
        if let Some(stripped) = rest.strip_prefix("github.com/") {
            rest = stripped;
        }
        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);

        let mut parts = rest.split('/');
        let (Some(owner), Some(repo), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if !is_valid_segment(owner) || !is_valid_segment(repo) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for RepoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Verified credential plus the resolved target repository.
#[derive(Clone)]
pub struct AuthContext {
    token: String,
    pub owner: String,
    pub repo: String,
    pub default_branch: String,
    /// Login of the authenticated user.
    pub login: String,
}

impl AuthContext {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        default_branch: impl Into<String>,
        login: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            default_branch: default_branch.into(),
            login: login.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("default_branch", &self.default_branch)
            .field("login", &self.login)
            .finish()
    }
}

/// Calls the executor makes against the remote repository.
#[async_trait]
pub trait ActionClient: Send + Sync {
    /// Validate `token` and resolve `repo` into a concrete target.
    async fn verify_credentials(&self, token: &str, repo: &str)
        -> Result<AuthContext, ActionError>;

    async fn create_issue(
        &self,
        auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError>;

    async fn create_pull_request(
        &self,
        auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError>;

    async fn merge_pull_request(&self, auth: &AuthContext, item_id: &str)
        -> Result<(), ActionError>;

    async fn create_commit(
        &self,
        auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError>;
}
