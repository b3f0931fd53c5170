//! GitHub REST transport.
//!
//! [`GithubApi`] is the seam between the GitHub handler and the network; the
//! handler only ever sees the typed payloads below.

use crate::address::validate_commit_hash;
use crate::error::{VcsError, VcsResult};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

const USER_AGENT: &str = concat!("vcs-proxy/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

static NAME_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid segment regex"));

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommit {
    pub sha: String,
    pub commit: ApiCommitDetail,
    #[serde(default)]
    pub parents: Vec<ApiParent>,
    /// Commit-wide line counts. Unlike `files`, never capped.
    pub stats: Option<ApiStats>,
    #[serde(default)]
    pub files: Vec<ApiFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiStats {
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommitDetail {
    pub message: String,
    pub author: ApiSignature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSignature {
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiParent {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiFile {
    pub filename: String,
    pub status: String,
    /// Post-commit blob id. Missing for some submodule changes.
    pub sha: Option<String>,
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
    /// Unified diff fragment starting at the first hunk header. Missing for
    /// binary files and very large diffs.
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTree {
    pub sha: String,
    pub tree: Vec<ApiTreeItem>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTreeItem {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

pub trait GithubApi: Send + Sync {
    /// `GET /repos/{owner}/{repo}/commits/{sha}`
    fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> VcsResult<ApiCommit>;

    /// `GET /repos/{owner}/{repo}/git/trees/{tree_ish}`, one layer only.
    fn get_tree(&self, owner: &str, repo: &str, tree_ish: &str) -> VcsResult<ApiTree>;

    /// `GET /repos/{owner}/{repo}/git/blobs/{sha}` as raw bytes.
    fn get_blob(&self, owner: &str, repo: &str, sha: &str) -> VcsResult<Vec<u8>>;
}

/// Blocking REST client, anonymous unless a token is configured.
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> VcsResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                VcsError::UpstreamUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        if token.is_none() {
            debug!("No GitHub token configured, using anonymous access");
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `/repos/{owner}/{repo}/{section}/{id}`, every segment checked before
    /// it reaches the URL.
    fn repo_path(owner: &str, repo: &str, section: &str, id: &str) -> VcsResult<String> {
        let owner = checked_name(owner)?;
        let repo = checked_name(repo)?;
        validate_commit_hash(id)?;
        Ok(format!("/repos/{owner}/{repo}/{section}/{id}"))
    }

    fn send(&self, request: RequestBuilder, what: &str) -> VcsResult<Response> {
        let response = request.send().map_err(|e| {
            VcsError::UpstreamUnavailable(format!("Request for {what} failed: {e}"))
        })?;
        check_status(response.status(), what)?;
        Ok(response)
    }
}

/// Owner and repository names must be a single path segment.
fn checked_name(name: &str) -> VcsResult<&str> {
    if NAME_SEGMENT_RE.is_match(name) && !name.chars().all(|c| c == '.') {
        Ok(name)
    } else {
        Err(VcsError::AddressParse(format!(
            "Invalid GitHub owner or repository name: {name}"
        )))
    }
}

/// Map an upstream status onto the error taxonomy.
pub fn check_status(status: StatusCode, what: &str) -> VcsResult<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(VcsError::NotFound(format!("Can't find {what}")))
        }
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            warn!("GitHub refused request for {what} with {status}, likely rate limited");
            Err(VcsError::UpstreamUnavailable(format!(
                "GitHub API rate limit reached while fetching {what}"
            )))
        }
        _ => Err(VcsError::UpstreamUnavailable(format!(
            "GitHub API answered {status} for {what}"
        ))),
    }
}

impl GithubApi for RestClient {
    fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> VcsResult<ApiCommit> {
        let what = format!("commit {owner}/{repo}@{sha}");
        let path = Self::repo_path(owner, repo, "commits", sha)?;
        let response = self.send(self.get(&path), &what)?;
        response.json().map_err(|e| {
            VcsError::UpstreamUnavailable(format!("Unreadable response for {what}: {e}"))
        })
    }

    fn get_tree(&self, owner: &str, repo: &str, tree_ish: &str) -> VcsResult<ApiTree> {
        let what = format!("tree {owner}/{repo}@{tree_ish}");
        let path = Self::repo_path(owner, repo, "git/trees", tree_ish)?;
        let response = self.send(self.get(&path), &what)?;
        let tree: ApiTree = response.json().map_err(|e| {
            VcsError::UpstreamUnavailable(format!("Unreadable response for {what}: {e}"))
        })?;
        if tree.truncated {
            warn!("GitHub truncated the listing of {what}");
        }
        Ok(tree)
    }

    fn get_blob(&self, owner: &str, repo: &str, sha: &str) -> VcsResult<Vec<u8>> {
        let what = format!("blob {owner}/{repo}@{sha}");
        let path = Self::repo_path(owner, repo, "git/blobs", sha)?;
        let request = self.get(&path).header(ACCEPT, RAW_MEDIA_TYPE);
        let response = self.send(request, &what)?;
        let bytes = response.bytes().map_err(|e| {
            VcsError::UpstreamUnavailable(format!("Unreadable response for {what}: {e}"))
        })?;
        Ok(bytes.to_vec())
    }
}
