//! Layered configuration.
//!
//! Sources in increasing precedence: built-in defaults, an optional TOML
//! file, `HISTORIAN_*` environment variables (`__` separates sections, e.g.
//! `HISTORIAN_RUN__CHUNK_SIZE`), then `GITHUB_TOKEN` as a token fallback.
//! CLI flags are applied on top by the binary.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::github::{default_roster, Contributor};
use crate::plan::content_service::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::scheduler::{RunConfig, DEFAULT_CHUNK_SIZE};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HISTORIAN";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "historian.toml";

/// Token fallback read when no token is configured.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Default per-request timeout of the GitHub client, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub token: String,
    pub repo: String,
    /// Alternative API root (GitHub Enterprise).
    pub api_base: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: RunConfig::default().repo,
            api_base: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub language: String,
    /// Content service key. Without it the template plan is used.
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            language: RunConfig::default().language,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CountSettings {
    pub issues: u32,
    pub prs: u32,
    pub commits: u32,
}

impl Default for CountSettings {
    fn default() -> Self {
        Self {
            issues: 5,
            prs: 5,
            commits: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub auto_merge: bool,
    pub chunk_size: usize,
    pub cooldown_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            auto_merge: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cooldown_ms: 2000,
        }
    }
}

/// Full configuration of the `historian` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorianConfig {
    pub github: GithubSettings,
    pub plan: PlanSettings,
    pub counts: CountSettings,
    pub run: RunSettings,
    /// Co-author roster for commits.
    pub contributors: Vec<Contributor>,
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            github: GithubSettings::default(),
            plan: PlanSettings::default(),
            counts: CountSettings::default(),
            run: RunSettings::default(),
            contributors: default_roster(),
        }
    }
}

impl HistorianConfig {
    /// Load from `path` (or `historian.toml` if present) plus the environment.
    ///
    /// Not validated: command-line overrides still apply on top, so callers
    /// run [`HistorianConfig::validate`] once those are in.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut loaded = Self::from_sources(path, true)?;
        loaded.apply_token_fallback(env::var(TOKEN_ENV_VAR).ok());
        Ok(loaded)
    }

    /// Load from a file only, ignoring the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let loaded = Self::from_sources(Some(path), false)?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn from_sources(path: Option<&Path>, with_env: bool) -> Result<Self, ConfigError> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();
        builder = match path {
            Some(path) => {
                builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml))
            }
            None => builder
                .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false)),
        };
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let loaded: Self = builder.build()?.try_deserialize()?;
        tracing::debug!(
            repo = %loaded.github.repo,
            chunk_size = loaded.run.chunk_size,
            "configuration loaded"
        );
        Ok(loaded)
    }

    /// Use `fallback` as the token when none was configured.
    pub fn apply_token_fallback(&mut self, fallback: Option<String>) {
        if !self.github.token.trim().is_empty() {
            return;
        }
        if let Some(token) = fallback.filter(|t| !t.trim().is_empty()) {
            self.github.token = token;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "run.chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.github.request_timeout_secs)
    }

    /// Settings for one scheduler run.
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            token: self.github.token.clone(),
            repo: self.github.repo.clone(),
            language: self.plan.language.clone(),
            issue_count: self.counts.issues,
            pr_count: self.counts.prs,
            commit_count: self.counts.commits,
            auto_merge: self.run.auto_merge,
            chunk_size: self.run.chunk_size,
            cooldown: Duration::from_millis(self.run.cooldown_ms),
        }
    }
}
