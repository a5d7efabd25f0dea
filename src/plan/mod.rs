//! Activity plan generation.
//!
//! A [`PlanGenerator`] turns a requested count into an ordered list of
//! [`ActivitySpec`]s. The scheduler treats an `Err` as a fatal setup failure,
//! so production wiring wraps the content service in a
//! [`FallbackPlanGenerator`] that substitutes the template plan instead of
//! failing.

pub mod content_service;
pub mod templates;

use async_trait::async_trait;

use crate::activity::ActivitySpec;
use crate::error::PlanError;

pub use content_service::ContentServicePlanGenerator;
pub use templates::TemplatePlanGenerator;

/// Produces the ordered plan for a run.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Generate between 1 and `count` specs for `repo`.
    async fn generate(
        &self,
        language: &str,
        repo: &str,
        count: usize,
    ) -> Result<Vec<ActivitySpec>, PlanError>;
}

/// Uses `primary`, falling back to the template plan when it fails or
/// returns nothing.
pub struct FallbackPlanGenerator<P> {
    primary: P,
    fallback: TemplatePlanGenerator,
}

impl<P: PlanGenerator> FallbackPlanGenerator<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallback: TemplatePlanGenerator::new(),
        }
    }
}

#[async_trait]
impl<P: PlanGenerator> PlanGenerator for FallbackPlanGenerator<P> {
    async fn generate(
        &self,
        language: &str,
        repo: &str,
        count: usize,
    ) -> Result<Vec<ActivitySpec>, PlanError> {
        match self.primary.generate(language, repo, count).await {
            Ok(mut plan) if !plan.is_empty() => {
                plan.truncate(count);
                Ok(plan)
            }
            Ok(_) => {
                tracing::warn!("plan generator returned no activities, using templates");
                Ok(self.fallback.plan(language, count))
            }
            Err(err) => {
                tracing::warn!(error = %err, "plan generation failed, using templates");
                Ok(self.fallback.plan(language, count))
            }
        }
    }
}
