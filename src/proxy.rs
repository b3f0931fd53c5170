//! Request routing in front of the registry.

use crate::address::GITHUB_HOST;
use crate::error::{VcsError, VcsResult};
use crate::model::EngineResult;
use crate::vcs::{Handler, Registry};
use log::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRequest {
    pub commit_hash: Option<String>,
    pub commit_link: Option<String>,
    pub repo_url: Option<String>,
    pub item_hash: Option<String>,
    pub item_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyResponse {
    Commit(EngineResult),
    File(Vec<u8>),
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ProxyRequest {
    /// The resource to resolve. GitHub commit links take priority, then the
    /// repository URL, then whatever link was given.
    pub fn select_resource(&self) -> Option<&str> {
        let link = non_empty(&self.commit_link);
        if let Some(link) = link.filter(|l| l.contains(GITHUB_HOST)) {
            return Some(link);
        }
        non_empty(&self.repo_url).or(link)
    }

    pub fn is_file_request(&self) -> bool {
        non_empty(&self.item_hash).is_some()
    }
}

fn invalid_resource() -> VcsError {
    VcsError::AddressParse("Please provide a valid resource URL.".to_string())
}

/// Pick a handler for `request`.
///
/// A bare repository URL only parses together with a hash, so a resource that
/// no backend accepts on its own is retried with the request's commit hash.
pub fn resolve_handler(registry: &Registry, request: &ProxyRequest) -> VcsResult<Box<dyn Handler>> {
    let resource = request.select_resource().ok_or_else(invalid_resource)?;
    if let Some(handler) = registry.resolve(resource) {
        return Ok(handler);
    }
    if let Some(hash) = non_empty(&request.commit_hash) {
        if let Some(handler) = registry.resolve_repo_and_hash(resource, hash) {
            return Ok(handler);
        }
    }
    debug!("No backend accepts {resource}");
    Err(invalid_resource())
}

pub fn handle(registry: &Registry, request: &ProxyRequest) -> VcsResult<ProxyResponse> {
    let handler = resolve_handler(registry, request)?;

    if let Some(item_hash) = non_empty(&request.item_hash) {
        let content = handler.get_file_content(item_hash, non_empty(&request.item_path))?;
        return Ok(ProxyResponse::File(content));
    }

    let result = handler.fetch_commit_data(non_empty(&request.commit_hash))?;
    Ok(ProxyResponse::Commit(result))
}

/// Reuse a stored tree cache when it is readable, otherwise fetch afresh.
///
/// The second element is the blob to store, set only when the data was
/// fetched.
pub fn load_tree(
    registry: &Registry,
    cached: Option<&str>,
    request: &ProxyRequest,
) -> VcsResult<(EngineResult, Option<String>)> {
    if let Some(cached) = cached.filter(|c| !c.trim().is_empty()) {
        match EngineResult::from_json(cached) {
            Ok(result) => {
                debug!("Using cached tree data");
                return Ok((result, None));
            }
            Err(e) => warn!("Ignoring unreadable tree cache: {e}"),
        }
    }

    let handler = resolve_handler(registry, request)?;
    let result = handler.fetch_commit_data(non_empty(&request.commit_hash))?;
    let blob = result
        .to_json()
        .map_err(|e| VcsError::UpstreamUnavailable(format!("Can't serialize tree cache: {e}")))?;
    info!(
        "Fetched tree data for {} ({} bytes)",
        handler.address().canonical_link(),
        blob.len()
    );
    Ok((result, Some(blob)))
}
