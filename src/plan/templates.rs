//! Deterministic fixed-template plan.

use async_trait::async_trait;

use crate::activity::{ActivitySpec, ActivityType};
use crate::error::PlanError;
use crate::plan::PlanGenerator;

/// Items per "batch" label in template titles.
const BATCH_LABEL_SIZE: usize = 5;

const LANGUAGE_PLACEHOLDER: &str = "{language}";

struct Template {
    kind: ActivityType,
    title: &'static str,
    description: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        kind: ActivityType::Issue,
        title: "Runtime error in {language} module",
        description: "Getting an undefined reference error when loading the core module on startup.",
    },
    Template {
        kind: ActivityType::Issue,
        title: "Feature: Dark mode support",
        description: "Users are requesting a dark mode toggle for the main dashboard interface.",
    },
    Template {
        kind: ActivityType::PullRequest,
        title: "Refactor auth middleware",
        description: "Cleaned up the authentication logic and added better error handling for 401 states.",
    },
    Template {
        kind: ActivityType::Commit,
        title: "Update README badges",
        description: "Added new status badges for CI pipelines.",
    },
    Template {
        kind: ActivityType::PullRequest,
        title: "Fix typos in documentation",
        description: "Corrected spelling mistakes in README and CONTRIBUTING.md.",
    },
    Template {
        kind: ActivityType::Commit,
        title: "Bump version number",
        description: "Incremented package version to 1.0.4",
    },
];

/// Cycles through a fixed set of templates. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePlanGenerator;

impl TemplatePlanGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Build `count` specs synchronously.
    pub fn plan(&self, language: &str, count: usize) -> Vec<ActivitySpec> {
        (0..count)
            .map(|i| {
                let template = &TEMPLATES[i % TEMPLATES.len()];
                let title = template.title.replace(LANGUAGE_PLACEHOLDER, language);
                ActivitySpec::new(
                    template.kind,
                    format!("{} (Batch {})", title, i / BATCH_LABEL_SIZE),
                    template.description,
                )
            })
            .collect()
    }
}

#[async_trait]
impl PlanGenerator for TemplatePlanGenerator {
    async fn generate(
        &self,
        language: &str,
        _repo: &str,
        count: usize,
    ) -> Result<Vec<ActivitySpec>, PlanError> {
        Ok(self.plan(language, count))
    }
}
