//! Historian: batch orchestration of repository activity.
//!
//! A run turns requested counts into a plan of activity specs, executes the
//! plan against the GitHub API in fixed-size concurrent chunks separated by
//! a cooldown, and publishes every step through a shared, observable
//! [`state::RunState`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use historian::github::{default_roster, OctocrabClient};
//! use historian::plan::TemplatePlanGenerator;
//! use historian::scheduler::{BatchScheduler, RunConfig};
//!
//! # async fn demo() -> Result<(), historian::error::RunError> {
//! let client = Arc::new(OctocrabClient::new(Duration::from_secs(30), default_roster()));
//! let scheduler = BatchScheduler::new(client, Arc::new(TemplatePlanGenerator::new()));
//! let config = RunConfig {
//!     token: "ghp_...".to_string(),
//!     repo: "octocat/hello-world".to_string(),
//!     ..RunConfig::default()
//! };
//! let summary = scheduler.start(&config).await?;
//! println!("created {} items", summary.created);
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod config;
pub mod error;
pub mod executor;
pub mod github;
pub mod plan;
pub mod scheduler;
pub mod state;

pub use activity::{ActivitySpec, ActivityType, GeneratedItem, ItemStatus};
pub use error::{ActionError, ConfigError, PlanError, RunError, RunResult};
pub use scheduler::{BatchScheduler, CancelHandle, RunConfig, RunSummary};
pub use state::{Lifecycle, RunState, RunStateHandle, Stats};
