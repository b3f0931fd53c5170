//! Backends and the registry that picks one for a commit address.

pub mod git_remote;
pub mod github;
pub mod github_api;
pub mod repo_cache;

use crate::address::CommitAddress;
use crate::config::Config;
use crate::error::{VcsError, VcsResult};
use crate::model::EngineResult;
use log::debug;
use std::sync::Arc;

pub use git_remote::{GitRemoteBackend, GitRemoteHandler};
pub use github::{GithubBackend, GithubHandler};
pub use github_api::{GithubApi, RestClient};
pub use repo_cache::LocalRepoCache;

/// One VCS integration. Parsing is pure; only [`Handler`]s do I/O.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse_link(&self, raw: &str) -> VcsResult<CommitAddress>;

    fn parse_repo_and_hash(&self, repo_url: &str, commit_hash: &str) -> VcsResult<CommitAddress>;

    /// Bind a session to an address this backend parsed.
    fn open(&self, address: CommitAddress) -> Box<dyn Handler>;
}

/// A session bound to one commit address.
pub trait Handler {
    fn address(&self) -> &CommitAddress;

    /// Metadata, patch and parent tree of `commit_hash`, or of the hash the
    /// address carries when `None`.
    fn fetch_commit_data(&self, commit_hash: Option<&str>) -> VcsResult<EngineResult>;

    /// Raw bytes of the blob `item_hash`, or of `item_path` below the tree-ish
    /// `item_hash`.
    fn get_file_content(&self, item_hash: &str, item_path: Option<&str>) -> VcsResult<Vec<u8>>;
}

/// Hash to work on: the explicit one, else the one carried by the address.
pub(crate) fn target_hash<'a>(
    address: &'a CommitAddress,
    commit_hash: Option<&'a str>,
) -> VcsResult<&'a str> {
    commit_hash
        .filter(|hash| !hash.trim().is_empty())
        .or_else(|| address.commit_hash())
        .ok_or_else(|| {
            VcsError::AddressParse(format!(
                "No commit hash given for {}",
                address.canonical_link()
            ))
        })
}

/// Ordered list of backends. The first one that parses an address wins.
pub struct Registry {
    backends: Vec<Box<dyn Backend>>,
}

impl Registry {
    /// GitHub first, then generic remotes: a GitHub URL is also a plausible
    /// generic repository URL.
    pub fn from_config(config: &Config) -> VcsResult<Self> {
        let client = RestClient::new(
            config.get_github_api_url(),
            config.get_github_token(),
            config.get_http_timeout(),
        )?;
        let cache = Arc::new(LocalRepoCache::new(config.get_repo_root()));
        Ok(Self::with_backends(vec![
            Box::new(GithubBackend::new(Arc::new(client))),
            Box::new(GitRemoteBackend::new(cache)),
        ]))
    }

    pub fn with_backends(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Handler for a composite commit link.
    pub fn resolve(&self, raw: &str) -> Option<Box<dyn Handler>> {
        self.first_match(|backend| backend.parse_link(raw))
    }

    /// Handler for a repository URL plus commit hash.
    pub fn resolve_repo_and_hash(&self, repo_url: &str, commit_hash: &str) -> Option<Box<dyn Handler>> {
        self.first_match(|backend| backend.parse_repo_and_hash(repo_url, commit_hash))
    }

    fn first_match<F>(&self, parse: F) -> Option<Box<dyn Handler>>
    where
        F: Fn(&dyn Backend) -> VcsResult<CommitAddress>,
    {
        for backend in &self.backends {
            match parse(backend.as_ref()) {
                Ok(address) => {
                    debug!("{} backend accepted {}", backend.name(), address.canonical_link());
                    return Some(backend.open(address));
                }
                Err(e) => debug!("{} backend rejected address: {e}", backend.name()),
            }
        }
        None
    }
}
