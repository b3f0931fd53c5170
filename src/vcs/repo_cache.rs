//! On-disk cache of bare clones, keyed by `(hostname, repo name)`.
//!
//! Clones live at `{root}/{hostname}/{repo name}`. Clone and fetch of one key
//! are serialized through a per-key mutex; distinct keys proceed in parallel.
//! Nothing here ever deletes a finished clone.

use crate::address::CommitAddress;
use crate::error::{VcsError, VcsResult};
use git2::Repository;
use git2::build::RepoBuilder;
use log::{debug, error, info};
use scc::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

pub struct LocalRepoCache {
    root: PathBuf,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl LocalRepoCache {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the clone of `address` lives, validated against traversal.
    pub fn repo_path(&self, address: &CommitAddress) -> VcsResult<PathBuf> {
        let hostname = address.hostname().ok_or_else(|| {
            VcsError::AddressParse(format!("No hostname in {}", address.repo_url()))
        })?;
        sanitized_repo_path(&self.root, &hostname, address.repo_name())
    }

    fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        let key = key.to_string_lossy().into_owned();
        if let Some(lock) = self.locks.read(&key, |_, v| Arc::clone(v)) {
            return lock;
        }
        let lock = Arc::new(Mutex::new(()));
        match self.locks.insert(key.clone(), Arc::clone(&lock)) {
            Ok(()) => lock,
            // Lost the race against another request.
            Err(_) => self
                .locks
                .read(&key, |_, v| Arc::clone(v))
                .unwrap_or(lock),
        }
    }

    /// Open the local clone of `address`, bare-cloning it first if needed.
    /// A failed clone leaves nothing behind.
    pub fn open_or_clone(&self, address: &CommitAddress) -> VcsResult<Repository> {
        let path = self.repo_path(address)?;
        self.open_or_clone_from(address.repo_url(), &path)
    }

    fn open_or_clone_from(&self, url: &str, path: &Path) -> VcsResult<Repository> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if path.is_dir() {
            debug!("Using cached clone at {}", path.display());
            return Repository::open_bare(path)
                .map_err(|e| VcsError::from_git(&format!("Can't open {}", path.display()), e));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                VcsError::UpstreamUnavailable(format!(
                    "Can't create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        info!("Cloning {url} into {}", path.display());
        match RepoBuilder::new().bare(true).clone(url, path) {
            Ok(repo) => Ok(repo),
            Err(e) => {
                error!("Can't clone repo {url}: {}", e.message());
                if path.exists() {
                    let _ = fs::remove_dir_all(path);
                }
                Err(VcsError::UpstreamUnavailable(format!(
                    "Can't clone repo {url}: {}",
                    e.message()
                )))
            }
        }
    }

    /// Fetch all remote branches of an already cloned repository.
    pub fn fetch(&self, address: &CommitAddress, repo: &Repository) -> VcsResult<()> {
        let path = self.repo_path(address)?;
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut remote = repo
            .find_remote("origin")
            .map_err(|e| VcsError::from_git("Can't find remote origin", e))?;
        remote
            .fetch(&[FETCH_REFSPEC], None, None)
            .map_err(|e| {
                VcsError::UpstreamUnavailable(format!(
                    "Can't fetch {}: {}",
                    address.repo_url(),
                    e.message()
                ))
            })?;
        debug!("Fetched updates for {}", address.repo_url());
        Ok(())
    }
}

/// `{root}/{hostname}/{repo_name}` with `..` neutralized and leading slashes
/// stripped from the repo name. Fails closed when the result still lands
/// outside `{root}/{hostname}`.
pub fn sanitized_repo_path(root: &Path, hostname: &str, repo_name: &str) -> VcsResult<PathBuf> {
    let host = Path::new(hostname)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if host.is_empty() || host == "." || host == ".." {
        return Err(VcsError::AddressParse(format!("Invalid hostname: {hostname}")));
    }

    let name = repo_name.replace("..", "__");
    let name = name.trim_start_matches('/');

    let host_dir = normalize_lexically(&root.join(&host));
    let candidate = normalize_lexically(&host_dir.join(name));
    ensure_within(&host_dir, &candidate, repo_name)?;
    Ok(candidate)
}

/// `candidate` must be a strict descendant of `base`.
pub fn ensure_within(base: &Path, candidate: &Path, repo_name: &str) -> VcsResult<()> {
    if candidate.starts_with(base) && candidate != base {
        return Ok(());
    }
    error!(
        "Invalid path: {repo_name} => {} escapes {}",
        candidate.display(),
        base.display()
    );
    Err(VcsError::PathTraversalRejected {
        repo_name: repo_name.to_string(),
        resolved: candidate.to_path_buf(),
    })
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
