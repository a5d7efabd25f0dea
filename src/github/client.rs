//! GitHub REST implementation of [`ActionClient`] built on octocrab.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use octocrab::Octocrab;
use serde::Deserialize;
use serde_json::json;

use crate::activity::{ActivitySpec, GeneratedItem};
use crate::error::ActionError;
use crate::github::contributors::{commit_message, CoAuthorPicker, Contributor};
use crate::github::{ActionClient, AuthContext, RepoIdentifier};

/// Directory that generated files are committed under.
const ACTIVITY_DIR: &str = "activity";

/// Branch prefix for pull-request branches.
const BRANCH_PREFIX: &str = "activity";

/// Length of the abbreviated commit sha used as an item id.
const SHORT_SHA_LEN: usize = 7;

const MAX_SLUG_LEN: usize = 40;

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Permissions {
    #[serde(default)]
    push: bool,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    owner: UserResponse,
    default_branch: Option<String>,
    #[serde(default)]
    permissions: Option<Permissions>,
}

/// Issues and pull requests share this shape.
#[derive(Debug, Deserialize)]
struct NumberedResponse {
    number: u64,
    html_url: Option<String>,
    user: Option<UserResponse>,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    commit: CommitResponse,
}

/// [`ActionClient`] over the GitHub REST API.
///
/// One octocrab client is built per token and reused for the lifetime of
/// this value. Every call is bounded by `request_timeout`.
pub struct OctocrabClient {
    api_base: Option<String>,
    request_timeout: Duration,
    co_authors: CoAuthorPicker,
    clients: Mutex<HashMap<String, Octocrab>>,
    sequence: AtomicU64,
}

impl OctocrabClient {
    pub fn new(request_timeout: Duration, roster: Vec<Contributor>) -> Self {
        Self {
            api_base: None,
            request_timeout,
            co_authors: CoAuthorPicker::new(roster),
            clients: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Point the client at a different API root (GitHub Enterprise).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    fn client_for(&self, token: &str) -> Result<Octocrab, ActionError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(token) {
            return Ok(client.clone());
        }

        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(base) = &self.api_base {
            builder = builder.base_uri(base.as_str())?;
        }
        let client = builder.build()?;
        clients.insert(token.to_string(), client.clone());
        Ok(client)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ActionError>
    where
        F: Future<Output = Result<T, ActionError>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.request_timeout)),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Commit a markdown file describing `spec` onto `branch`.
    async fn put_activity_file(
        &self,
        client: &Octocrab,
        auth: &AuthContext,
        spec: &ActivitySpec,
        branch: &str,
        co_authors: &[Contributor],
    ) -> Result<CommitResponse, ActionError> {
        let path = activity_file_path(
            &spec.title,
            Utc::now().timestamp_millis(),
            self.next_sequence(),
        );
        let route = format!("/repos/{}/{}/contents/{}", auth.owner, auth.repo, path);
        let body = json!({
            "message": commit_message(&spec.title, &spec.description, co_authors),
            "content": encode_content(&activity_file_body(spec)),
            "branch": branch,
        });
        let response: ContentsResponse = client.put(route, Some(&body)).await?;
        Ok(response.commit)
    }
}

#[async_trait]
impl ActionClient for OctocrabClient {
    async fn verify_credentials(
        &self,
        token: &str,
        repo: &str,
    ) -> Result<AuthContext, ActionError> {
        let target = RepoIdentifier::parse(repo)?;
        let client = self.client_for(token)?;

        self.bounded(async {
            let user: UserResponse = client.get("/user", None::<&()>).await?;
            let route = format!("/repos/{}/{}", target.owner, target.repo);
            let resolved: RepoResponse = client.get(route, None::<&()>).await?;

            let full_name = format!("{}/{}", resolved.owner.login, resolved.name);
            if let Some(permissions) = &resolved.permissions {
                if !permissions.push {
                    return Err(ActionError::PermissionDenied(full_name));
                }
            }

            tracing::debug!(login = %user.login, repo = %full_name, "credentials verified");
            Ok::<_, ActionError>(AuthContext::new(
                token,
                resolved.owner.login,
                resolved.name,
                resolved.default_branch.unwrap_or_else(|| "main".to_string()),
                user.login,
            ))
        })
        .await
    }

    async fn create_issue(
        &self,
        auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError> {
        let client = self.client_for(auth.token())?;
        self.bounded(async {
            let route = format!("/repos/{}/{}/issues", auth.owner, auth.repo);
            let body = json!({ "title": spec.title, "body": spec.description });
            let issue: NumberedResponse = client.post(route, Some(&body)).await?;
            Ok::<_, ActionError>(numbered_item(spec, issue, &auth.login))
        })
        .await
    }

    async fn create_pull_request(
        &self,
        auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError> {
        let client = self.client_for(auth.token())?;
        self.bounded(async {
            let head_route = format!(
                "/repos/{}/{}/git/ref/heads/{}",
                auth.owner, auth.repo, auth.default_branch
            );
            let head: RefResponse = client.get(head_route, None::<&()>).await?;

            let branch = branch_name(
                &spec.title,
                Utc::now().timestamp_millis(),
                self.next_sequence(),
            );
            let refs_route = format!("/repos/{}/{}/git/refs", auth.owner, auth.repo);
            let ref_body = json!({
                "ref": format!("refs/heads/{}", branch),
                "sha": head.object.sha,
            });
            let _: serde_json::Value = client.post(refs_route, Some(&ref_body)).await?;

            self.put_activity_file(&client, auth, spec, &branch, &[]).await?;

            let pulls_route = format!("/repos/{}/{}/pulls", auth.owner, auth.repo);
            let pr_body = json!({
                "title": spec.title,
                "head": branch,
                "base": auth.default_branch,
                "body": spec.description,
            });
            let pr: NumberedResponse = client.post(pulls_route, Some(&pr_body)).await?;
            Ok::<_, ActionError>(numbered_item(spec, pr, &auth.login))
        })
        .await
    }

    async fn merge_pull_request(
        &self,
        auth: &AuthContext,
        item_id: &str,
    ) -> Result<(), ActionError> {
        let number: u64 = item_id
            .parse()
            .map_err(|_| ActionError::InvalidItemId(item_id.to_string()))?;
        let client = self.client_for(auth.token())?;
        self.bounded(async {
            let route = format!("/repos/{}/{}/pulls/{}/merge", auth.owner, auth.repo, number);
            let body = json!({ "merge_method": "squash" });
            let _: serde_json::Value = client.put(route, Some(&body)).await?;
            Ok::<_, ActionError>(())
        })
        .await
    }

    async fn create_commit(
        &self,
        auth: &AuthContext,
        spec: &ActivitySpec,
    ) -> Result<GeneratedItem, ActionError> {
        let client = self.client_for(auth.token())?;
        let co_authors = self.co_authors.pick(&auth.login);
        self.bounded(async {
            let commit = self
                .put_activity_file(&client, auth, spec, &auth.default_branch, &co_authors)
                .await?;
            if commit.sha.len() < SHORT_SHA_LEN {
                return Err(ActionError::UnexpectedResponse(format!(
                    "commit sha '{}' is too short",
                    commit.sha
                )));
            }

            let names = co_authors.iter().map(|c| c.name.clone()).collect();
            let mut item = GeneratedItem::created(spec, &commit.sha[..SHORT_SHA_LEN], &auth.login)
                .with_co_authors(names);
            if let Some(url) = commit.html_url {
                item = item.with_url(url);
            }
            Ok::<_, ActionError>(item)
        })
        .await
    }
}

fn numbered_item(
    spec: &ActivitySpec,
    response: NumberedResponse,
    fallback_author: &str,
) -> GeneratedItem {
    let author = response
        .user
        .map(|u| u.login)
        .unwrap_or_else(|| fallback_author.to_string());
    let item = GeneratedItem::created(spec, response.number.to_string(), author);
    match response.html_url {
        Some(url) => item.with_url(url),
        None => item,
    }
}

/// Lowercase ASCII slug of `title`, words joined by `-`.
pub(crate) fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    if slug.is_empty() {
        slug.push_str("activity");
    }
    slug
}

fn branch_name(title: &str, millis: i64, sequence: u64) -> String {
    format!("{}/{}-{}-{}", BRANCH_PREFIX, slugify(title), millis, sequence)
}

fn activity_file_path(title: &str, millis: i64, sequence: u64) -> String {
    format!("{}/{}-{}-{}.md", ACTIVITY_DIR, millis, sequence, slugify(title))
}

fn activity_file_body(spec: &ActivitySpec) -> String {
    format!("# {}\n\n{}\n", spec.title.trim(), spec.description.trim())
}

fn encode_content(body: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(body.as_bytes())
}
