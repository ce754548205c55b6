//! GitHub API client: pull-request discovery, diff download and
//! marker-keyed comment upsert, plus workflow annotations pointing at
//! missing lines.

use std::fmt;

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{DiffcovError, Result};
use crate::model::Group;

const API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "diffcov";

/// Login the default GitHub Actions token posts under. `GET /user` is
/// forbidden for that token, so it is recognized by the 403 instead.
const GITHUB_ACTIONS_LOGIN: &str = "github-actions[bot]";

/// Minimal authenticated client for the GitHub REST API.
pub struct Client {
    token: String,
    repo: String,
}

impl Client {
    #[must_use]
    pub fn new(token: &str, repo: &str) -> Self {
        Self {
            token: token.to_string(),
            repo: repo.to_string(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.github_token, &config.github_repository)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        ureq::request(method, &format!("{API_BASE}{path}"))
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", USER_AGENT)
            .set("X-GitHub-Api-Version", API_VERSION)
    }

    /// Fetch repository metadata.
    pub fn repository_info(&self) -> Result<RepositoryInfo> {
        let resp = self
            .request("GET", &format!("/repos/{}", self.repo))
            .call()
            .map_err(|e| http_error("fetching repository info", e))?;
        resp.into_json()
            .map_err(|e| DiffcovError::Http(format!("invalid repository payload: {e}")))
    }

    /// Resolve the pull request this run operates on.
    ///
    /// Tries, in order: an explicit `GITHUB_PR_NUMBER`, a
    /// `refs/pull/{n}/merge` ref, then an open pull request whose head
    /// branch matches `GITHUB_REF`. Explicitly numbered pull requests
    /// must still be open.
    pub fn pr_number(&self, config: &Config) -> Result<u64> {
        if let Some(number) = config.github_pr_number {
            let pr = self.pull_request(number)?;
            if pr.state != "open" {
                return Err(DiffcovError::CannotGetPullRequest(format!(
                    "pull request #{number} is {}",
                    pr.state
                )));
            }
            return Ok(pr.number);
        }

        let Some(github_ref) = config.github_ref.as_deref() else {
            return Err(DiffcovError::CannotGetPullRequest(
                "no pull request reference in the environment".to_string(),
            ));
        };
        if let Some(number) = pr_number_from_ref(github_ref) {
            return Ok(number);
        }

        // Push event: find an open PR whose head is this branch.
        let branch = github_ref.strip_prefix("refs/heads/").unwrap_or(github_ref);
        let owner = self.repo.split('/').next().unwrap_or(&self.repo);
        let path = format!(
            "/repos/{}/pulls?state=open&head={owner}:{branch}&sort=updated&direction=desc",
            self.repo
        );
        let prs: Vec<PullRequest> = match self.request("GET", &path).call() {
            Ok(resp) => resp
                .into_json()
                .map_err(|e| DiffcovError::Http(format!("invalid pull request list: {e}")))?,
            Err(ureq::Error::Status(code @ (403 | 404), _)) => {
                return Err(DiffcovError::CannotGetPullRequest(format!(
                    "listing pull requests for branch {branch}: HTTP {code}"
                )))
            }
            Err(e) => return Err(http_error("listing pull requests", e)),
        };
        match prs.iter().find(|pr| pr.state == "open") {
            Some(pr) => Ok(pr.number),
            None => Err(DiffcovError::CannotGetPullRequest(format!(
                "no open pull request with head branch {branch}"
            ))),
        }
    }

    fn pull_request(&self, number: u64) -> Result<PullRequest> {
        match self
            .request("GET", &format!("/repos/{}/pulls/{number}", self.repo))
            .call()
        {
            Ok(resp) => resp
                .into_json()
                .map_err(|e| DiffcovError::Http(format!("invalid pull request payload: {e}"))),
            Err(ureq::Error::Status(code @ (403 | 404), _)) => Err(
                DiffcovError::CannotGetPullRequest(format!("pull request #{number}: HTTP {code}")),
            ),
            Err(e) => Err(http_error("fetching pull request", e)),
        }
    }

    /// Fetch the unified diff for a pull request.
    pub fn pr_diff(&self, number: u64) -> Result<String> {
        debug!("Fetching diff for {}#{number}", self.repo);
        match self
            .request("GET", &format!("/repos/{}/pulls/{number}", self.repo))
            .set("Accept", "application/vnd.github.v3.diff")
            .call()
        {
            Ok(resp) => resp
                .into_string()
                .map_err(|e| DiffcovError::Http(format!("reading pull request diff body: {e}"))),
            Err(ureq::Error::Status(code @ (403 | 404), _)) => Err(
                DiffcovError::CannotGetPullRequest(format!("diff of #{number}: HTTP {code}")),
            ),
            Err(e) => Err(http_error("fetching pull request diff", e)),
        }
    }

    /// Login of the authenticated user.
    pub fn my_login(&self) -> Result<String> {
        match self.request("GET", "/user").call() {
            Ok(resp) => {
                let user: User = resp
                    .into_json()
                    .map_err(|e| DiffcovError::Http(format!("invalid user payload: {e}")))?;
                Ok(user.login)
            }
            Err(ureq::Error::Status(403, _)) => {
                debug!("Cannot read /user, assuming the Actions bot token");
                Ok(GITHUB_ACTIONS_LOGIN.to_string())
            }
            Err(e) => Err(http_error("fetching authenticated user", e)),
        }
    }

    /// Create or update the diff-coverage comment on a pull request.
    ///
    /// An earlier comment is recognized by `marker` in its body and `me`
    /// as its author, and edited in place; otherwise a new comment is
    /// created. Any rejection (fork token without write access, body over
    /// the size limit, ...) surfaces as [`DiffcovError::CannotPostComment`].
    pub fn post_comment(&self, me: &str, number: u64, body: &str, marker: &str) -> Result<()> {
        match self.find_existing_comment(me, number, marker)? {
            Some(comment_id) => {
                debug!("Updating existing comment {comment_id}");
                self.send_comment(
                    "PATCH",
                    &format!("/repos/{}/issues/comments/{comment_id}", self.repo),
                    body,
                )
            }
            None => {
                debug!("Creating new comment on #{number}");
                self.send_comment(
                    "POST",
                    &format!("/repos/{}/issues/{number}/comments", self.repo),
                    body,
                )
            }
        }
    }

    fn send_comment(&self, method: &str, path: &str, body: &str) -> Result<()> {
        match self
            .request(method, path)
            .send_json(serde_json::json!({ "body": body }))
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                Err(DiffcovError::CannotPostComment(format!(
                    "HTTP {code}: {text}"
                )))
            }
            Err(e) => Err(http_error("posting comment", e)),
        }
    }

    /// Find our own earlier comment on a PR (by hidden marker and author).
    fn find_existing_comment(&self, me: &str, number: u64, marker: &str) -> Result<Option<u64>> {
        let mut page = 1u32;
        loop {
            let path = format!(
                "/repos/{}/issues/{number}/comments?per_page=100&page={page}",
                self.repo
            );
            let resp = self
                .request("GET", &path)
                .call()
                .map_err(|e| http_error("listing comments", e))?;

            let comments: Vec<Comment> = resp
                .into_json()
                .map_err(|e| DiffcovError::Http(format!("invalid comment list: {e}")))?;
            if comments.is_empty() {
                break;
            }
            for comment in &comments {
                if is_own_comment(comment, me, marker) {
                    return Ok(Some(comment.id));
                }
            }
            page += 1;
        }
        Ok(None)
    }
}

fn http_error(context: &str, err: ureq::Error) -> DiffcovError {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            DiffcovError::Http(format!("{context}: HTTP {code}: {body}"))
        }
        e => DiffcovError::Http(format!("{context}: {e}")),
    }
}

/// Extract a PR number from a ref like `refs/pull/42/merge`.
fn pr_number_from_ref(github_ref: &str) -> Option<u64> {
    let parts: Vec<&str> = github_ref.split('/').collect();
    if parts.len() >= 3 && parts[0] == "refs" && parts[1] == "pull" {
        parts[2].parse().ok()
    } else {
        None
    }
}

fn is_own_comment(comment: &Comment, me: &str, marker: &str) -> bool {
    let body_matches = comment
        .body
        .as_deref()
        .is_some_and(|body| body.contains(marker));
    let author_matches = comment.user.as_ref().is_some_and(|user| user.login == me);
    body_matches && author_matches
}

/// Repository metadata used to pick the comparison branch and to decide
/// whether file links are useful.
#[derive(Debug, Deserialize)]
pub struct RepositoryInfo {
    pub default_branch: String,
    pub visibility: String,
}

impl RepositoryInfo {
    #[must_use]
    pub fn is_default_branch(&self, git_ref: &str) -> bool {
        let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
        branch == self.default_branch
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.visibility == "public"
    }
}

#[derive(Deserialize)]
struct PullRequest {
    number: u64,
    state: String,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Comment {
    id: u64,
    body: Option<String>,
    user: Option<User>,
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// Severity of a workflow annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnnotationType {
    Notice,
    Warning,
    Error,
}

impl AnnotationType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationType::Notice => "notice",
            AnnotationType::Warning => "warning",
            AnnotationType::Error => "error",
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnnotationType {
    type Err = DiffcovError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "notice" => Ok(AnnotationType::Notice),
            "warning" => Ok(AnnotationType::Warning),
            "error" => Ok(AnnotationType::Error),
            _ => Err(DiffcovError::Config(format!(
                "invalid annotation type {s:?} (expected notice, warning or error)"
            ))),
        }
    }
}

/// One annotation covering a contiguous range of missing lines.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub title: String,
    pub message_type: String,
    pub message: String,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in {}:{}-{}",
            self.message_type, self.message, self.file, self.line_start, self.line_end
        )
    }
}

/// Build one annotation per missing-line group.
#[must_use]
pub fn create_missing_coverage_annotations(
    annotation_type: AnnotationType,
    groups: &[Group],
) -> Vec<Annotation> {
    groups
        .iter()
        .map(|group| {
            let message = if group.line_start == group.line_end {
                format!("Missing coverage on line {}", group.line_start)
            } else {
                format!(
                    "Missing coverage on lines {}-{}",
                    group.line_start, group.line_end
                )
            };
            Annotation {
                file: group.file.clone(),
                line_start: group.line_start,
                line_end: group.line_end,
                title: "Missing coverage".to_string(),
                message_type: annotation_type.as_str().to_string(),
                message,
            }
        })
        .collect()
}
