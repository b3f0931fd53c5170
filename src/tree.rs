//! Tree walking over any object store that can list one tree at a time.

use crate::error::{VcsError, VcsResult};
use git2::{ObjectType, Oid, Repository};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// One file or directory of a walked snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "sha")]
    pub content_hash: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Blob,
    Tree,
    Submodule,
}

/// A direct child of a tree as the object store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTreeEntry {
    pub name: String,
    pub id: String,
    pub kind: RawKind,
}

pub trait TreeSource {
    /// List the direct children of the tree (or tree-ish) `tree_id`.
    fn read_tree(&self, tree_id: &str) -> VcsResult<Vec<RawTreeEntry>>;
}

/// Walk the tree `root_id` depth-first, children in store order.
///
/// Submodule entries are skipped. With `recursive` off only the top layer is
/// listed.
pub fn walk(source: &dyn TreeSource, root_id: &str, recursive: bool) -> VcsResult<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    walk_into(source, root_id, "", recursive, &mut entries)?;
    Ok(entries)
}

fn walk_into(
    source: &dyn TreeSource,
    tree_id: &str,
    prefix: &str,
    recursive: bool,
    out: &mut Vec<TreeEntry>,
) -> VcsResult<()> {
    for child in source.read_tree(tree_id)? {
        let path = if prefix.is_empty() {
            child.name.clone()
        } else {
            format!("{prefix}/{}", child.name)
        };
        match child.kind {
            RawKind::Submodule => continue,
            RawKind::Blob => out.push(TreeEntry {
                path,
                content_hash: child.id,
                kind: EntryKind::Blob,
            }),
            RawKind::Tree => {
                out.push(TreeEntry {
                    path: path.clone(),
                    content_hash: child.id.clone(),
                    kind: EntryKind::Tree,
                });
                if recursive {
                    walk_into(source, &child.id, &path, recursive, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Blob id of `path` below `root_id`, descending one component at a time.
///
/// Returns `None` when a component is missing, when an intermediate component
/// is not a directory, or when the final component is not a file.
pub fn resolve_path(source: &dyn TreeSource, root_id: &str, path: &str) -> VcsResult<Option<String>> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let Some((last, dirs)) = components.split_last() else {
        return Ok(None);
    };

    let mut current = root_id.to_string();
    for dir in dirs {
        let next = source
            .read_tree(&current)?
            .into_iter()
            .find(|entry| entry.name == *dir && entry.kind == RawKind::Tree);
        match next {
            Some(entry) => current = entry.id,
            None => return Ok(None),
        }
    }

    Ok(source
        .read_tree(&current)?
        .into_iter()
        .find(|entry| entry.name == *last && entry.kind == RawKind::Blob)
        .map(|entry| entry.id))
}

/// Tree source backed by a local object store.
pub struct GitTreeSource<'a>(pub &'a Repository);

impl TreeSource for GitTreeSource<'_> {
    fn read_tree(&self, tree_id: &str) -> VcsResult<Vec<RawTreeEntry>> {
        // Short ids go through revparse; `Oid::from_str` would zero-pad them.
        let full_id = Some(tree_id)
            .filter(|id| id.len() == 40)
            .and_then(|id| Oid::from_str(id).ok());
        let tree = match full_id {
            Some(oid) => self.0.find_tree(oid),
            None => self
                .0
                .revparse_single(tree_id)
                .and_then(|object| object.peel_to_tree()),
        }
        .map_err(|e| VcsError::from_git(&format!("Can't read tree {tree_id}"), e))?;

        let mut children = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let kind = match entry.kind() {
                Some(ObjectType::Blob) => RawKind::Blob,
                Some(ObjectType::Tree) => RawKind::Tree,
                Some(ObjectType::Commit) => RawKind::Submodule,
                _ => continue,
            };
            children.push(RawTreeEntry {
                name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                id: entry.id().to_string(),
                kind,
            });
        }
        Ok(children)
    }
}
