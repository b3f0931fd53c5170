use super::github_api::{ApiCommit, GithubApi};
use super::{Backend, Handler, target_hash};
use crate::address::{self, CommitAddress};
use crate::diff::parse_patch_fragment;
use crate::error::{VcsError, VcsResult};
use crate::model::{
    CommitMetadata, CommitStats, EngineResult, FileChangeMetadata, FileStatus, PatchedFile,
};
use crate::tree::{self, RawKind, RawTreeEntry, TreeSource};
use log::{info, warn};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

pub struct GithubBackend {
    api: Arc<dyn GithubApi>,
}

impl GithubBackend {
    pub fn new(api: Arc<dyn GithubApi>) -> Self {
        Self { api }
    }
}

impl Backend for GithubBackend {
    fn name(&self) -> &'static str {
        "github"
    }

    fn parse_link(&self, raw: &str) -> VcsResult<CommitAddress> {
        address::parse_github_link(raw)
    }

    fn parse_repo_and_hash(&self, repo_url: &str, commit_hash: &str) -> VcsResult<CommitAddress> {
        address::parse_github_repo_and_hash(repo_url, commit_hash)
    }

    fn open(&self, address: CommitAddress) -> Box<dyn Handler> {
        Box::new(GithubHandler::new(address, Arc::clone(&self.api)))
    }
}

pub struct GithubHandler {
    address: CommitAddress,
    owner: String,
    api: Arc<dyn GithubApi>,
}

impl GithubHandler {
    pub fn new(address: CommitAddress, api: Arc<dyn GithubApi>) -> Self {
        let owner = address.owner().unwrap_or_default().to_string();
        Self {
            address,
            owner,
            api,
        }
    }

    fn repo(&self) -> &str {
        self.address.repo_name()
    }

    fn tree_source(&self) -> ApiTreeSource<'_> {
        ApiTreeSource {
            api: &*self.api,
            owner: &self.owner,
            repo: self.repo(),
        }
    }

    fn patched_files(&self, commit: &ApiCommit) -> (Vec<FileChangeMetadata>, BTreeMap<String, PatchedFile>) {
        let mut files = Vec::with_capacity(commit.files.len());
        let mut patched = BTreeMap::new();

        for file in &commit.files {
            let status = FileStatus::from_str(&file.status).unwrap_or_else(|e| {
                warn!("{e} for {}, treating it as modified", file.filename);
                FileStatus::Modified
            });
            let deltas = match parse_patch_fragment(file.patch.as_deref()) {
                Ok(deltas) => deltas,
                Err(e) => {
                    warn!("Dropping deltas of {} in {}: {e}", file.filename, commit.sha);
                    Vec::new()
                }
            };

            files.push(FileChangeMetadata {
                path: file.filename.clone(),
                status,
                additions: file.additions,
                deletions: file.deletions,
            });
            patched.insert(
                file.filename.clone(),
                PatchedFile {
                    status,
                    content_hash: file.sha.clone(),
                    deltas,
                },
            );
        }
        (files, patched)
    }
}

impl Handler for GithubHandler {
    fn address(&self) -> &CommitAddress {
        &self.address
    }

    fn fetch_commit_data(&self, commit_hash: Option<&str>) -> VcsResult<EngineResult> {
        let hash = target_hash(&self.address, commit_hash)?;
        address::validate_commit_hash(hash)?;
        let commit = self.api.get_commit(&self.owner, self.repo(), hash)?;

        // Root commits are listed against their own tree.
        let parent_hash = commit
            .parents
            .first()
            .map(|parent| parent.sha.clone())
            .unwrap_or_else(|| commit.sha.clone());

        let (files, patched_files) = self.patched_files(&commit);
        let tree = tree::walk(&self.tree_source(), &parent_hash, false)?;

        let metadata = CommitMetadata {
            parent_commit_hash: parent_hash,
            authored_at: commit.commit.author.date.timestamp(),
            message: commit.commit.message.clone(),
            stats: commit
                .stats
                .as_ref()
                .map(|stats| CommitStats::new(stats.additions, stats.deletions))
                .unwrap_or_else(|| CommitStats::from_files(&files)),
            files,
        };
        Ok(EngineResult::assemble(tree, patched_files, metadata))
    }

    fn get_file_content(&self, item_hash: &str, item_path: Option<&str>) -> VcsResult<Vec<u8>> {
        address::validate_commit_hash(item_hash)?;
        let blob_hash = match item_path {
            Some(path) => tree::resolve_path(&self.tree_source(), item_hash, path)?
                .ok_or_else(|| VcsError::NotFound(format!("Can't find {path} in {item_hash}")))?,
            None => item_hash.to_string(),
        };
        let content = self.api.get_blob(&self.owner, self.repo(), &blob_hash)?;
        info!("Retrieved {} bytes from blob {blob_hash}", content.len());
        Ok(content)
    }
}

/// Lists trees through the API, one request per tree.
struct ApiTreeSource<'a> {
    api: &'a dyn GithubApi,
    owner: &'a str,
    repo: &'a str,
}

impl TreeSource for ApiTreeSource<'_> {
    fn read_tree(&self, tree_id: &str) -> VcsResult<Vec<RawTreeEntry>> {
        let listing = self.api.get_tree(self.owner, self.repo, tree_id)?;
        Ok(listing
            .tree
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => RawKind::Blob,
                    "tree" => RawKind::Tree,
                    "commit" => RawKind::Submodule,
                    _ => return None,
                };
                Some(RawTreeEntry {
                    name: item.path,
                    id: item.sha,
                    kind,
                })
            })
            .collect())
    }
}
