//! Per-type success counters.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityType;

/// Success counters for a single run.
///
/// Each counter only ever increases within a run and is bumped once per
/// confirmed creation of the corresponding type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub issues: u32,
    pub prs: u32,
    pub commits: u32,
    pub discussions: u32,
}

impl Stats {
    /// Count one successful creation of `kind`.
    ///
    /// Returns `false` for types that have no counter.
    pub fn increment(&mut self, kind: ActivityType) -> bool {
        match kind {
            ActivityType::Issue => self.issues += 1,
            ActivityType::PullRequest => self.prs += 1,
            ActivityType::Commit => self.commits += 1,
            ActivityType::Discussion => self.discussions += 1,
            ActivityType::Release => return false,
        }
        true
    }

    pub fn count_for(&self, kind: ActivityType) -> u32 {
        match kind {
            ActivityType::Issue => self.issues,
            ActivityType::PullRequest => self.prs,
            ActivityType::Commit => self.commits,
            ActivityType::Discussion => self.discussions,
            ActivityType::Release => 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.issues + self.prs + self.commits + self.discussions
    }
}
