//! GitHub API helpers for fetching pull request diffs and publishing diff
//! coverage: one summary comment plus inline review comments, all tagged
//! with a hidden marker so reruns update instead of piling up.

use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn, Span};

use crate::model::AnnotationRequest;
use crate::report::AnnotationPlan;

const DEFAULT_API_URL: &str = "https://api.github.com";

/// Resolved GitHub Actions context, read from environment variables.
pub struct Context {
    token: String,
    repo: String,
    pr_number: u64,
    api_url: String,
    pub sha: Option<String>,
}

impl Context {
    /// Build a context from standard GitHub Actions environment variables
    /// (`GITHUB_TOKEN`, `GITHUB_REPOSITORY`, `GITHUB_REF`, `GITHUB_SHA`,
    /// `GITHUB_API_URL`, `GITHUB_EVENT_PATH`).
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .context("GITHUB_TOKEN environment variable is required")?;
        let repo = std::env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?;
        let github_ref = std::env::var("GITHUB_REF").unwrap_or_default();
        let pr_number = pr_number_from_ref(&github_ref)
            .context("could not determine PR number from GITHUB_REF")?;
        let api_url = std::env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        // On pull_request events GITHUB_SHA is the merge commit; review
        // comments must point at the head commit instead.
        let sha = head_sha_from_event().or_else(|| std::env::var("GITHUB_SHA").ok());
        Ok(Self {
            token,
            repo,
            pr_number,
            api_url,
            sha,
        })
    }

    /// Fetch the unified diff for the pull request.
    pub fn fetch_diff(&self) -> Result<String> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_url, self.repo, self.pr_number);
        let resp = self
            .request("GET", &url)
            .set("Accept", "application/vnd.github.v3.diff")
            .call()
            .context("Failed to fetch PR diff from GitHub")?;
        resp.into_string()
            .context("Failed to read PR diff response body")
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        ureq::request(method, url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "patchcov")
            .set("X-GitHub-Api-Version", "2022-11-28")
    }

    /// GET every page of a list endpoint.
    fn get_all<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let paged = format!("{url}?per_page=100&page={page}");
            let items: Vec<T> = self
                .request("GET", &paged)
                .call()
                .with_context(|| format!("Failed to list {url}"))?
                .into_json()
                .context("Failed to parse GitHub JSON")?;
            if items.is_empty() {
                break;
            }
            let last_page = items.len() < 100;
            out.extend(items);
            if last_page {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    fn send(&self, method: &str, url: &str, body: Option<serde_json::Value>) -> Result<()> {
        let req = self.request(method, url);
        let resp = match body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };
        match resp {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                bail!("GitHub API error on {method} {url} (HTTP {code}): {body}")
            }
            Err(e) => bail!("{method} {url} failed: {e}"),
        }
    }
}

/// Extract PR number from GITHUB_REF (e.g. "refs/pull/42/merge" → 42).
fn pr_number_from_ref(github_ref: &str) -> Option<u64> {
    let parts: Vec<&str> = github_ref.split('/').collect();
    if parts.len() >= 3 && parts[0] == "refs" && parts[1] == "pull" {
        parts[2].parse().ok()
    } else {
        None
    }
}

fn head_sha_from_event() -> Option<String> {
    let path = std::env::var("GITHUB_EVENT_PATH").ok()?;
    let raw = std::fs::read(path).ok()?;
    let event: serde_json::Value = serde_json::from_slice(&raw).ok()?;
    event["pull_request"]["head"]["sha"]
        .as_str()
        .map(str::to_string)
}

#[derive(Deserialize)]
struct IssueComment {
    id: u64,
    body: Option<String>,
}

/// An inline review comment already on the pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub start_line: Option<u32>,
}

impl ReviewComment {
    fn location(&self) -> Option<(String, u32, u32)> {
        let end = self.line?;
        let start = self.start_line.unwrap_or(end);
        Some((self.path.clone(), start, end))
    }
}

/// What to change so the pull request shows exactly the planned
/// annotations.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub create: Vec<AnnotationRequest>,
    pub update: Vec<(u64, AnnotationRequest)>,
    pub delete: Vec<u64>,
}

/// Match marker-tagged review comments against planned annotations by
/// `(path, start_line, end_line)`. Comments without the marker are never
/// touched.
pub fn plan_sync(existing: &[ReviewComment], wanted: &[AnnotationRequest], marker: &str) -> SyncPlan {
    let mut ours: BTreeMap<(String, u32, u32), Vec<&ReviewComment>> = BTreeMap::new();
    let mut delete = Vec::new();

    for comment in existing {
        if !comment.body.as_deref().is_some_and(|b| b.contains(marker)) {
            continue;
        }
        match comment.location() {
            Some(key) => ours.entry(key).or_default().push(comment),
            // Outdated comments lose their line; they no longer apply.
            None => delete.push(comment.id),
        }
    }

    let mut plan = SyncPlan::default();
    let mut matched: HashSet<(String, u32, u32)> = HashSet::new();
    for request in wanted {
        let key = (request.path.clone(), request.start_line, request.end_line);
        if !matched.insert(key.clone()) {
            continue;
        }
        match ours.get(&key).and_then(|found| found.first()) {
            Some(comment) => {
                if comment.body.as_deref() != Some(request.message.as_str()) {
                    plan.update.push((comment.id, request.clone()));
                }
            }
            None => plan.create.push(request.clone()),
        }
    }

    for (key, comments) in &ours {
        let keep_first = matched.contains(key);
        let stale = comments.iter().skip(usize::from(keep_first));
        delete.extend(stale.map(|c| c.id));
    }

    delete.sort_unstable();
    plan.delete = delete;
    plan
}

/// Sends an annotation plan to a review system.
pub trait Publisher {
    fn publish(&self, plan: &AnnotationPlan) -> Result<()>;
}

/// Publishes to a GitHub pull request.
pub struct GitHubPublisher {
    context: Context,
    marker: String,
    span: Span,
}

impl GitHubPublisher {
    pub fn new(context: Context, marker: impl Into<String>, span: Span) -> Self {
        Self {
            context,
            marker: marker.into(),
            span,
        }
    }

    /// Create or update the summary comment on the PR.
    fn publish_summary(&self, body: &str) -> Result<()> {
        let ctx = &self.context;
        let list_url = format!("{}/repos/{}/issues/{}/comments", ctx.api_url, ctx.repo, ctx.pr_number);
        let comments: Vec<IssueComment> = ctx.get_all(&list_url)?;
        let existing = comments
            .iter()
            .find(|c| c.body.as_deref().is_some_and(|b| b.contains(&self.marker)));

        match existing {
            Some(comment) => {
                let url = format!("{}/repos/{}/issues/comments/{}", ctx.api_url, ctx.repo, comment.id);
                ctx.send("PATCH", &url, Some(json!({ "body": body })))?;
            }
            None => {
                ctx.send("POST", &list_url, Some(json!({ "body": body })))?;
            }
        }
        info!(parent: &self.span, repo = %ctx.repo, pr = ctx.pr_number, "summary comment posted");
        Ok(())
    }

    fn publish_annotations(&self, annotations: &[AnnotationRequest]) -> Result<()> {
        let ctx = &self.context;
        let list_url = format!("{}/repos/{}/pulls/{}/comments", ctx.api_url, ctx.repo, ctx.pr_number);
        let existing: Vec<ReviewComment> = ctx.get_all(&list_url)?;
        let plan = plan_sync(&existing, annotations, &self.marker);

        for id in &plan.delete {
            let url = format!("{}/repos/{}/pulls/comments/{id}", ctx.api_url, ctx.repo);
            if let Err(e) = ctx.send("DELETE", &url, None) {
                warn!(parent: &self.span, error = %e, "could not delete stale annotation");
            }
        }

        for (id, request) in &plan.update {
            let url = format!("{}/repos/{}/pulls/comments/{id}", ctx.api_url, ctx.repo);
            if let Err(e) = ctx.send("PATCH", &url, Some(json!({ "body": request.message }))) {
                warn!(parent: &self.span, error = %e, file = %request.path, "could not update annotation");
            }
        }

        if !plan.create.is_empty() {
            let Some(sha) = ctx.sha.as_deref() else {
                bail!("cannot create review comments without a commit SHA (set GITHUB_SHA)");
            };
            for request in &plan.create {
                let mut body = json!({
                    "body": request.message,
                    "commit_id": sha,
                    "path": request.path,
                    "line": request.end_line,
                    "side": "RIGHT",
                });
                if request.start_line != request.end_line {
                    body["start_line"] = json!(request.start_line);
                    body["start_side"] = json!("RIGHT");
                }
                // Lines outside the PR diff are rejected; keep going.
                if let Err(e) = ctx.send("POST", &list_url, Some(body)) {
                    warn!(parent: &self.span, error = %e, file = %request.path, "could not create annotation");
                }
            }
        }

        info!(
            parent: &self.span,
            created = plan.create.len(),
            updated = plan.update.len(),
            deleted = plan.delete.len(),
            "annotations synced"
        );
        Ok(())
    }
}

impl Publisher for GitHubPublisher {
    fn publish(&self, plan: &AnnotationPlan) -> Result<()> {
        self.publish_annotations(&plan.annotations)?;
        self.publish_summary(&plan.summary)
    }
}
