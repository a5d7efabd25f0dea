//! Activity data model.
//!
//! An [`ActivitySpec`] is a requested operation produced by a plan generator.
//! A [`GeneratedItem`] is the record of a spec that the action executor
//! successfully carried out against the remote repository.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of repository activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityType {
    Issue,
    #[serde(rename = "PR")]
    PullRequest,
    Commit,
    Discussion,
    Release,
}

impl ActivityType {
    /// Wire label, matching the serialized form.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActivityType::Issue => "ISSUE",
            ActivityType::PullRequest => "PR",
            ActivityType::Commit => "COMMIT",
            ActivityType::Discussion => "DISCUSSION",
            ActivityType::Release => "RELEASE",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A requested activity, prior to execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySpec {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub title: String,
    pub description: String,
}

impl ActivitySpec {
    pub fn new(
        kind: ActivityType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Lifecycle of a generated item.
///
/// Items are recorded as `Created`; the only transition afterwards is
/// `Created -> Merged`, performed by the auto-merge follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Created,
    Merged,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Created => "created",
            ItemStatus::Merged => "merged",
            ItemStatus::Failed => "failed",
        }
    }
}

/// Result record of a successfully executed [`ActivitySpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedItem {
    /// Identifier assigned by the remote API (issue/PR number, short commit sha).
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub title: String,
    pub description: String,
    pub status: ItemStatus,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co_authors: Option<Vec<String>>,
}

impl GeneratedItem {
    /// Build a freshly created item for `spec`.
    pub fn created(spec: &ActivitySpec, id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: spec.kind,
            title: spec.title.clone(),
            description: spec.description.clone(),
            status: ItemStatus::Created,
            timestamp: Utc::now(),
            author: author.into(),
            url: None,
            co_authors: None,
        }
    }

    /// Attach the item's web URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Credit co-authors by name. An empty list leaves the field unset.
    pub fn with_co_authors(mut self, co_authors: Vec<String>) -> Self {
        if !co_authors.is_empty() {
            self.co_authors = Some(co_authors);
        }
        self
    }

    /// Apply the single permitted status transition.
    ///
    /// Returns `false` (and leaves the item untouched) unless the item is a
    /// pull request currently in `Created`.
    pub fn mark_merged(&mut self) -> bool {
        if self.kind == ActivityType::PullRequest && self.status == ItemStatus::Created {
            self.status = ItemStatus::Merged;
            true
        } else {
            false
        }
    }
}
