use super::repo_cache::LocalRepoCache;
use super::{Backend, Handler, target_hash};
use crate::address::{self, CommitAddress};
use crate::diff::{FilePatch, from_git2_patch};
use crate::error::{VcsError, VcsResult};
use crate::model::{
    CommitMetadata, CommitStats, EngineResult, FileChangeMetadata, FileStatus, PatchedFile,
};
use crate::tree::{self, GitTreeSource};
use git2::{Commit, Delta, ErrorCode, Patch, Repository};
use log::{error, info, warn};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct GitRemoteBackend {
    cache: Arc<LocalRepoCache>,
}

impl GitRemoteBackend {
    pub fn new(cache: Arc<LocalRepoCache>) -> Self {
        Self { cache }
    }
}

impl Backend for GitRemoteBackend {
    fn name(&self) -> &'static str {
        "git-remote"
    }

    fn parse_link(&self, raw: &str) -> VcsResult<CommitAddress> {
        address::parse_remote_link(raw)
    }

    fn parse_repo_and_hash(&self, repo_url: &str, commit_hash: &str) -> VcsResult<CommitAddress> {
        address::parse_remote_repo_and_hash(repo_url, commit_hash)
    }

    fn open(&self, address: CommitAddress) -> Box<dyn Handler> {
        Box::new(GitRemoteHandler::new(address, Arc::clone(&self.cache)))
    }
}

/// Serves one address from a local bare clone, opened on first use.
pub struct GitRemoteHandler {
    address: CommitAddress,
    cache: Arc<LocalRepoCache>,
    repo: OnceCell<Repository>,
}

/// Object lookups: missing or wrong-typed objects are `NotFound`, ambiguous
/// short hashes are the caller's fault.
fn lookup_error(context: &str, err: git2::Error) -> VcsError {
    match err.code() {
        ErrorCode::NotFound | ErrorCode::Peel | ErrorCode::InvalidSpec => {
            VcsError::NotFound(format!("{context}: {}", err.message()))
        }
        ErrorCode::Ambiguous => VcsError::AddressParse(format!("{context}: {}", err.message())),
        _ => VcsError::from_git(context, err),
    }
}

fn find_commit<'r>(repo: &'r Repository, hash: &str) -> VcsResult<Option<Commit<'r>>> {
    match repo.revparse_single(hash).and_then(|object| object.peel_to_commit()) {
        Ok(commit) => Ok(Some(commit)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(lookup_error(&format!("Can't read commit {hash}"), e)),
    }
}

impl GitRemoteHandler {
    pub fn new(address: CommitAddress, cache: Arc<LocalRepoCache>) -> Self {
        Self {
            address,
            cache,
            repo: OnceCell::new(),
        }
    }

    fn repo(&self) -> VcsResult<&Repository> {
        if let Some(repo) = self.repo.get() {
            return Ok(repo);
        }
        let repo = self.cache.open_or_clone(&self.address)?;
        Ok(self.repo.get_or_init(|| repo))
    }

    /// Look `hash` up, fetching once on a miss.
    fn commit<'r>(&self, repo: &'r Repository, hash: &str) -> VcsResult<Commit<'r>> {
        if let Some(commit) = find_commit(repo, hash)? {
            return Ok(commit);
        }
        warn!(
            "Can't find commit_hash {hash} in {}. Fetching updates and retrying.",
            self.address.repo_url()
        );
        self.cache.fetch(&self.address, repo)?;

        find_commit(repo, hash)?.ok_or_else(|| {
            error!(
                "Can't find commit_hash {hash} in {}. Cancelling request.",
                self.address.repo_url()
            );
            VcsError::NotFound(format!("Can't find commit_hash {hash} in given repo."))
        })
    }

    fn file_patches(
        &self,
        repo: &Repository,
        old_tree: Option<&git2::Tree<'_>>,
        new_tree: &git2::Tree<'_>,
    ) -> VcsResult<Vec<FilePatch>> {
        let diff = repo
            .diff_tree_to_tree(old_tree, Some(new_tree), None)
            .map_err(|e| VcsError::from_git("Can't diff commit against its parent", e))?;

        let mut patches = Vec::with_capacity(diff.deltas().len());
        for (idx, delta) in diff.deltas().enumerate() {
            let status = match delta.status() {
                Delta::Added => FileStatus::Added,
                Delta::Deleted => FileStatus::Removed,
                _ => FileStatus::Modified,
            };
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();

            let patch = Patch::from_diff(&diff, idx)
                .map_err(|e| VcsError::from_git(&format!("Can't build patch for {path}"), e))?;
            let Some(patch) = patch else {
                patches.push(FilePatch {
                    path,
                    status,
                    additions: 0,
                    deletions: 0,
                    deltas: Vec::new(),
                });
                continue;
            };

            match from_git2_patch(path.clone(), status, &patch) {
                Ok(file) => patches.push(file),
                Err(e) => {
                    warn!("Dropping deltas of {path}: {e}");
                    let (_, additions, deletions) = patch.line_stats().unwrap_or((0, 0, 0));
                    patches.push(FilePatch {
                        path,
                        status,
                        additions,
                        deletions,
                        deltas: Vec::new(),
                    });
                }
            }
        }
        Ok(patches)
    }
}

impl Handler for GitRemoteHandler {
    fn address(&self) -> &CommitAddress {
        &self.address
    }

    fn fetch_commit_data(&self, commit_hash: Option<&str>) -> VcsResult<EngineResult> {
        let hash = target_hash(&self.address, commit_hash)?;
        address::validate_commit_hash(hash)?;

        let repo = self.repo()?;
        let commit = self.commit(repo, hash)?;
        let commit_tree = commit
            .tree()
            .map_err(|e| lookup_error(&format!("Can't read tree of {hash}"), e))?;

        let parent = if commit.parent_count() > 0 {
            Some(
                commit
                    .parent(0)
                    .map_err(|e| lookup_error(&format!("Can't read parent of {hash}"), e))?,
            )
        } else {
            None
        };
        let parent_tree = match &parent {
            Some(parent) => Some(
                parent
                    .tree()
                    .map_err(|e| lookup_error(&format!("Can't read tree of {}", parent.id()), e))?,
            ),
            None => None,
        };

        // Root commits are listed against their own tree.
        let parent_hash = parent.as_ref().unwrap_or(&commit).id().to_string();
        let listing_tree_id = parent_tree.as_ref().unwrap_or(&commit_tree).id().to_string();
        let commit_tree_id = commit_tree.id().to_string();

        let source = GitTreeSource(repo);
        let tree = tree::walk(&source, &listing_tree_id, false)?;

        let patches = self.file_patches(repo, parent_tree.as_ref(), &commit_tree)?;
        let files: Vec<FileChangeMetadata> = patches.iter().map(FileChangeMetadata::from).collect();

        let mut patched_files = BTreeMap::new();
        for patch in patches {
            let lookup_tree = if patch.status == FileStatus::Added {
                &commit_tree_id
            } else {
                &listing_tree_id
            };
            let content_hash = tree::resolve_path(&source, lookup_tree, &patch.path)?;
            patched_files.insert(
                patch.path,
                PatchedFile {
                    status: patch.status,
                    content_hash,
                    deltas: patch.deltas,
                },
            );
        }

        let metadata = CommitMetadata {
            parent_commit_hash: parent_hash,
            authored_at: commit.author().when().seconds(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            stats: CommitStats::from_files(&files),
            files,
        };
        Ok(EngineResult::assemble(tree, patched_files, metadata))
    }

    fn get_file_content(&self, item_hash: &str, item_path: Option<&str>) -> VcsResult<Vec<u8>> {
        address::validate_commit_hash(item_hash)?;
        let repo = self.repo()?;

        let blob_id = match item_path {
            Some(path) => {
                let tree_id = repo
                    .revparse_single(item_hash)
                    .and_then(|object| object.peel_to_tree())
                    .map_err(|e| lookup_error(&format!("Can't find tree {item_hash}"), e))?
                    .id()
                    .to_string();
                tree::resolve_path(&GitTreeSource(repo), &tree_id, path)?.ok_or_else(|| {
                    VcsError::NotFound(format!("Can't find {path} in {item_hash}"))
                })?
            }
            None => item_hash.to_string(),
        };

        let blob = repo
            .revparse_single(&blob_id)
            .and_then(|object| object.peel_to_blob())
            .map_err(|e| lookup_error(&format!("Can't find blob {blob_id}"), e))?;
        info!("Retrieved {} bytes from blob {blob_id}", blob.size());
        Ok(blob.content().to_vec())
    }
}
