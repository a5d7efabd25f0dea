//! Contributor roster and co-author selection for commits.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Maximum co-authors attached to a single commit.
pub const MAX_CO_AUTHORS: usize = 2;

/// A git identity that can be credited as a co-author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl Contributor {
    pub fn new(name: &str, email: &str, role: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    /// `Co-authored-by` trailer line.
    pub fn trailer(&self) -> String {
        format!("Co-authored-by: {} <{}>", self.name, self.email)
    }
}

/// Built-in roster, using noreply-style addresses.
pub fn default_roster() -> Vec<Contributor> {
    vec![
        Contributor::new(
            "Sarah_Dev_99",
            "sarah.dev@users.noreply.github.com",
            "Maintainer",
        ),
        Contributor::new("TurboBot_AI", "bot@turbo.ai", "Bot"),
        Contributor::new(
            "AlexM_FullStack",
            "alex.m@users.noreply.github.com",
            "Contributor",
        ),
        Contributor::new("Quality_Gate_keeper", "qa@example.com", "QA"),
        Contributor::new(
            "Newbie_Coder",
            "newbie@users.noreply.github.com",
            "Junior",
        ),
    ]
}

/// Rotates through a roster handing out co-authors.
///
/// Selection is deterministic: the n-th call starts at roster position n.
#[derive(Debug, Default)]
pub struct CoAuthorPicker {
    roster: Vec<Contributor>,
    cursor: AtomicUsize,
}

impl CoAuthorPicker {
    pub fn new(roster: Vec<Contributor>) -> Self {
        Self {
            roster,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Pick up to [`MAX_CO_AUTHORS`] contributors, skipping `exclude_login`.
    pub fn pick(&self, exclude_login: &str) -> Vec<Contributor> {
        if self.roster.is_empty() {
            return Vec::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let len = self.roster.len();
        (0..len)
            .map(|offset| &self.roster[(start + offset) % len])
            .filter(|c| !c.name.eq_ignore_ascii_case(exclude_login))
            .take(MAX_CO_AUTHORS)
            .cloned()
            .collect()
    }
}

/// Commit message with a title, body and co-author trailers.
pub fn commit_message(title: &str, body: &str, co_authors: &[Contributor]) -> String {
    let mut message = title.trim().to_string();
    if !body.trim().is_empty() {
        message.push_str("\n\n");
        message.push_str(body.trim());
    }
    if !co_authors.is_empty() {
        message.push_str("\n\n");
        let trailers: Vec<String> = co_authors.iter().map(Contributor::trailer).collect();
        message.push_str(&trailers.join("\n"));
    }
    message
}
