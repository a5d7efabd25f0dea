//! Plan generation through a generative content HTTP service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::activity::{ActivitySpec, ActivityType};
use crate::error::PlanError;
use crate::plan::PlanGenerator;

/// Default API root of the content service.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Most items requested from the service in one call.
pub const MAX_BATCH: usize = 20;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Asks a content service for realistic issue/PR/commit titles and bodies.
#[derive(Debug, Clone)]
pub struct ContentServicePlanGenerator {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ContentServicePlanGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self, PlanError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl PlanGenerator for ContentServicePlanGenerator {
    async fn generate(
        &self,
        language: &str,
        repo: &str,
        count: usize,
    ) -> Result<Vec<ActivitySpec>, PlanError> {
        let batch = count.min(MAX_BATCH);
        if batch == 0 {
            return Err(PlanError::Empty);
        }

        tracing::debug!(model = %self.model, batch, "requesting activity plan");
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(&build_prompt(batch, repo, language)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlanError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        parse_response(&payload)
    }
}

pub(crate) fn build_prompt(batch: usize, repo: &str, language: &str) -> String {
    format!(
        "You are a GitHub Activity Generator.\n\
         Generate {batch} realistic GitHub items for a repository named \"{repo}\" in \"{language}\".\n\
         Return a mix of Issues, Pull Requests, and standalone Commits.\n\n\
         For each item provide:\n\
         - type: 'ISSUE', 'PR', or 'COMMIT'\n\
         - title: A realistic title (max 50 chars)\n\
         - description: A realistic body text.\n\n\
         Return strictly JSON."
    )
}

pub(crate) fn request_body(prompt: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "type": { "type": "STRING", "enum": ["ISSUE", "PR", "COMMIT"] },
                        "title": { "type": "STRING" },
                        "description": { "type": "STRING" }
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Extract specs from a `generateContent` response.
pub(crate) fn parse_response(payload: &Value) -> Result<Vec<ActivitySpec>, PlanError> {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| PlanError::Malformed("response has no candidate text".to_string()))?;
    parse_plan_text(text)
}

/// Decode the JSON array the service returns as text.
pub(crate) fn parse_plan_text(text: &str) -> Result<Vec<ActivitySpec>, PlanError> {
    let raw: Vec<RawSpec> = serde_json::from_str(text.trim())?;
    let specs: Vec<ActivitySpec> = raw
        .into_iter()
        .filter_map(|item| {
            let title = item.title.map(|t| t.trim().to_string())?;
            if title.is_empty() {
                return None;
            }
            Some(ActivitySpec::new(
                map_kind(item.kind.as_deref()),
                title,
                item.description.unwrap_or_default(),
            ))
        })
        .collect();

    if specs.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(specs)
}

/// Unknown or missing types become pull requests.
fn map_kind(kind: Option<&str>) -> ActivityType {
    match kind.map(str::trim) {
        Some(k) if k.eq_ignore_ascii_case("ISSUE") => ActivityType::Issue,
        Some(k) if k.eq_ignore_ascii_case("COMMIT") => ActivityType::Commit,
        _ => ActivityType::PullRequest,
    }
}
