use color_eyre::eyre::Result;
use git2::build::RepoBuilder;
use git2::{Oid, Repository};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vcs_proxy::error::{VcsError, VcsResult};
use vcs_proxy::proxy::{self, ProxyRequest, ProxyResponse};
use vcs_proxy::vcs::github_api::{ApiCommit, ApiTree, GithubApi};
use vcs_proxy::vcs::{GitRemoteBackend, GithubBackend, LocalRepoCache, Registry};

const GITHUB_LINK: &str = "https://github.com/owner/repo/commit/abcdef1";

/// Serves one commit with one file, whatever is asked for.
struct StaticGithubApi;

impl GithubApi for StaticGithubApi {
    fn get_commit(&self, _owner: &str, _repo: &str, sha: &str) -> VcsResult<ApiCommit> {
        if !"abcdef1234".starts_with(sha) {
            return Err(VcsError::NotFound(format!("Can't find commit {sha}")));
        }
        Ok(serde_json::from_value(json!({
            "sha": "abcdef1234",
            "commit": {"message": "Fix", "author": {"date": "2020-02-02T00:00:00Z"}},
            "parents": [{"sha": "5555555"}],
            "files": [{
                "filename": "a.c",
                "status": "modified",
                "sha": "aaaaaaa",
                "additions": 1,
                "deletions": 1,
                "patch": "@@ -1 +1 @@\n-old\n+new"
            }]
        }))
        .unwrap())
    }

    fn get_tree(&self, _owner: &str, _repo: &str, _tree_ish: &str) -> VcsResult<ApiTree> {
        Ok(serde_json::from_value(json!({
            "sha": "7777777",
            "tree": [{"path": "a.c", "type": "blob", "sha": "bbbbbbb"}]
        }))
        .unwrap())
    }

    fn get_blob(&self, _owner: &str, _repo: &str, sha: &str) -> VcsResult<Vec<u8>> {
        match sha {
            "bbbbbbb" => Ok(b"old\n".to_vec()),
            _ => Err(VcsError::NotFound(format!("Can't find blob {sha}"))),
        }
    }
}

fn create_test_repo() -> Result<(TempDir, Repository)> {
    let temp_dir = TempDir::new()?;
    let repo = Repository::init(temp_dir.path())?;
    let mut config = repo.config()?;
    config.set_str("user.name", "Test User")?;
    config.set_str("user.email", "test@example.com")?;
    Ok((temp_dir, repo))
}

fn create_commit(repo: &Repository, filename: &str, content: &str, message: &str) -> Result<Oid> {
    let repo_path = repo.workdir().unwrap().to_path_buf();
    fs::write(repo_path.join(filename), content)?;

    let mut index = repo.index()?;
    index.add_path(Path::new(filename))?;
    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let signature = git2::Signature::now("Test User", "test@example.com")?;
    let parent_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
    Ok(repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?)
}

struct Setup {
    _source_dir: TempDir,
    _cache_dir: TempDir,
    registry: Registry,
    head: Oid,
}

fn setup() -> Result<Setup> {
    let (source_dir, source) = create_test_repo()?;
    create_commit(&source, "lib.c", "int f;\n", "Add lib")?;
    let head = create_commit(&source, "lib.c", "int f = 0;\n", "Initialize f")?;

    let cache_dir = TempDir::new()?;
    let clone_path = cache_dir.path().join("git.example.com").join("lib");
    fs::create_dir_all(clone_path.parent().unwrap())?;
    RepoBuilder::new()
        .bare(true)
        .clone(source_dir.path().to_str().unwrap(), &clone_path)?;

    let cache = Arc::new(LocalRepoCache::new(cache_dir.path().to_path_buf()));
    let registry = Registry::with_backends(vec![
        Box::new(GithubBackend::new(Arc::new(StaticGithubApi))),
        Box::new(GitRemoteBackend::new(cache)),
    ]);

    Ok(Setup {
        _source_dir: source_dir,
        _cache_dir: cache_dir,
        registry,
        head,
    })
}

fn github_request() -> ProxyRequest {
    ProxyRequest {
        commit_link: Some(GITHUB_LINK.to_string()),
        repo_url: Some("https://git.example.com/mirror/lib.git".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_commit_request_through_github() -> Result<()> {
    let setup = setup()?;
    let response = proxy::handle(&setup.registry, &github_request())?;

    let ProxyResponse::Commit(result) = response else {
        panic!("expected commit data");
    };
    assert_eq!(result.commit.parent_commit_hash, "5555555");
    assert_eq!(result.patched_files["a.c"].deltas.len(), 2);
    Ok(())
}

#[test]
fn test_file_request_through_github() -> Result<()> {
    let setup = setup()?;
    let request = ProxyRequest {
        item_hash: Some("5555555".to_string()),
        item_path: Some("a.c".to_string()),
        ..github_request()
    };
    assert_eq!(
        proxy::handle(&setup.registry, &request)?,
        ProxyResponse::File(b"old\n".to_vec())
    );
    Ok(())
}

#[test]
fn test_repo_url_with_commit_hash() -> Result<()> {
    let setup = setup()?;
    let request = ProxyRequest {
        commit_link: Some("https://cgit.example.com/lib/commit/?id=1".to_string()),
        repo_url: Some("https://git.example.com/mirror/lib.git".to_string()),
        commit_hash: Some(setup.head.to_string()),
        ..Default::default()
    };

    let ProxyResponse::Commit(result) = proxy::handle(&setup.registry, &request)? else {
        panic!("expected commit data");
    };
    assert_eq!(result.commit.message, "Initialize f");
    assert_eq!(result.commit.stats.total, 2);
    Ok(())
}

#[test]
fn test_github_repo_url_needs_commit_hash() -> Result<()> {
    let setup = setup()?;
    let mut request = ProxyRequest {
        repo_url: Some("https://github.com/owner/repo".to_string()),
        commit_hash: Some("abcdef1".to_string()),
        ..Default::default()
    };
    let ProxyResponse::Commit(result) = proxy::handle(&setup.registry, &request)? else {
        panic!("expected commit data");
    };
    assert_eq!(result.commit.stats.total, 2);

    request.commit_hash = None;
    let err = proxy::handle(&setup.registry, &request).unwrap_err();
    assert!(matches!(err, VcsError::AddressParse(_)));
    Ok(())
}

#[test]
fn test_unresolvable_resource() -> Result<()> {
    let setup = setup()?;
    let request = ProxyRequest {
        commit_link: Some("https://example.com/not-a-repo".to_string()),
        ..Default::default()
    };
    let err = proxy::handle(&setup.registry, &request).unwrap_err();
    assert!(matches!(err, VcsError::AddressParse(_)));
    assert_eq!(err.to_body().msg, "Please provide a valid resource URL.");
    assert_eq!(err.status_code(), 400);

    let err = proxy::handle(&setup.registry, &ProxyRequest::default()).unwrap_err();
    assert!(matches!(err, VcsError::AddressParse(_)));
    Ok(())
}

#[test]
fn test_tree_cache_is_reused() -> Result<()> {
    let setup = setup()?;
    let request = github_request();

    let (fresh, blob) = proxy::load_tree(&setup.registry, None, &request)?;
    let blob = blob.expect("fresh data must be stored");

    let (cached, none) = proxy::load_tree(&setup.registry, Some(&blob), &request)?;
    assert!(none.is_none());
    assert_eq!(cached, fresh);
    Ok(())
}

#[test]
fn test_unreadable_tree_cache_is_refreshed() -> Result<()> {
    let setup = setup()?;
    let request = github_request();

    for stale in ["", "   ", "{\"commit\": 1}", "not json"] {
        let (result, blob) = proxy::load_tree(&setup.registry, Some(stale), &request)?;
        assert!(blob.is_some(), "{stale:?} should trigger a fetch");
        assert_eq!(result.commit.message, "Fix");
    }
    Ok(())
}
